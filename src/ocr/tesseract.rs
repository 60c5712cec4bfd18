//! [`Recognizer`] backed by the `tesseract` command-line binary.
//!
//! Each call writes the image to a scratch PNG and runs
//!
//! ```text
//! tesseract <img.png> stdout -l <lang> --psm <n> --oem <n> [-c k=v ...] tsv
//! ```
//!
//! Text is rebuilt from the TSV word rows (lines split on newline, blocks
//! and paragraphs on a blank line) and the confidence is the mean of the
//! word confidences, ignoring the `-1` rows tesseract emits for layout
//! elements. Orientation uses `--psm 0` and reads the `Rotate:` line.

use super::{Recognition, RecognitionOptions, Recognizer};
use crate::error::RecognitionError;
use crate::tools::{Invocation, ScratchFile};
use image::GrayImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use tracing::debug;

/// Drives the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_dir: None,
        }
    }

    /// Use traineddata from `dir` instead of the installation default.
    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    fn base_invocation(&self, input: &ScratchFile) -> Invocation {
        let inv = Invocation::new(&self.binary).arg(input.path()).arg("stdout");
        match &self.tessdata_dir {
            Some(dir) => inv.arg("--tessdata-dir").arg(dir),
            None => inv,
        }
    }

    fn write_png(image: &GrayImage) -> Result<ScratchFile, RecognitionError> {
        let scratch =
            ScratchFile::new(".png").map_err(|e| RecognitionError::Input(e.to_string()))?;
        image
            .save_with_format(scratch.path(), image::ImageFormat::Png)
            .map_err(|e| RecognitionError::Input(e.to_string()))?;
        Ok(scratch)
    }
}

impl Recognizer for TesseractCli {
    fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, RecognitionError> {
        let input = Self::write_png(image)?;
        let output = self
            .base_invocation(&input)
            .arg("-l")
            .arg(&options.language)
            .arg("--psm")
            .arg(options.segmentation_mode.psm().to_string())
            .arg("--oem")
            .arg(options.engine_mode.oem().to_string())
            .args(&options.extra_config)
            .arg("tsv")
            .run()
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;

        let recognition = parse_tsv(&output.stdout)?;
        debug!(
            "tesseract psm {} → {} chars, conf {:.1}",
            options.segmentation_mode.psm(),
            recognition.text.len(),
            recognition.confidence
        );
        Ok(recognition)
    }

    fn detect_orientation(&self, image: &GrayImage) -> Option<u32> {
        let input = Self::write_png(image).ok()?;
        let output = self
            .base_invocation(&input)
            .args(["--psm", "0"])
            .run()
            .ok()?;
        parse_osd_rotation(&output.stdout)
    }
}

static RE_ROTATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Rotate:\s+(\d+)").unwrap());

/// Extract the `Rotate: N` angle from OSD output.
pub fn parse_osd_rotation(osd: &str) -> Option<u32> {
    RE_ROTATE
        .captures(osd)
        .and_then(|c| c[1].parse::<u32>().ok())
        .map(|deg| deg % 360)
}

/// Rebuild text and mean confidence from tesseract TSV output.
pub fn parse_tsv(tsv: &str) -> Result<Recognition, RecognitionError> {
    let mut lines = tsv.lines();
    let header = lines
        .next()
        .ok_or_else(|| RecognitionError::Output("empty TSV".into()))?;
    if !header.starts_with("level") {
        return Err(RecognitionError::Output(format!(
            "unexpected TSV header: {header}"
        )));
    }

    let mut text = String::new();
    let mut conf_sum = 0.0f64;
    let mut conf_n = 0usize;
    let mut last: Option<(u32, u32, u32)> = None;

    for row in lines {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let conf: f64 = cols[10].trim().parse().unwrap_or(-1.0);
        if word.is_empty() || conf < 0.0 {
            continue;
        }
        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));

        match last {
            None => {}
            Some((b, p, _)) if (b, p) != (key.0, key.1) => text.push_str("\n\n"),
            Some(prev) if prev != key => text.push('\n'),
            Some(_) => text.push(' '),
        }
        text.push_str(word);
        last = Some(key);

        conf_sum += conf;
        conf_n += 1;
    }

    let confidence = if conf_n == 0 {
        0.0
    } else {
        (conf_sum / conf_n as f64) as f32
    };
    Ok(Recognition { text, confidence })
}
