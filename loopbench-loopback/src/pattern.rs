//! Generator input synthesis
//!
//! Turns a test-pattern request into an ffmpeg lavfi source and the full
//! argument list that feeds the loopback device.

use crate::provisioner::ProvisionError;
use std::path::Path;

/// Build the lavfi source expression for `pattern`.
///
/// - empty or `testsrc` selects the default test card
/// - any other bare name selects that lavfi source (`smptebars`, `rgbtestsrc`, ...)
/// - `color=<c>` produces a solid color
///
/// Other `key=value` forms have no generator translation and are rejected.
pub fn generator_source(
    pattern: &str,
    width: u32,
    height: u32,
    fps: u32,
) -> Result<String, ProvisionError> {
    let pattern = pattern.trim();

    if let Some((key, value)) = pattern.split_once('=') {
        return match key {
            "color" if !value.is_empty() => {
                Ok(format!("color=c={value}:s={width}x{height}:r={fps}"))
            }
            _ => Err(ProvisionError::InvalidPattern(pattern.to_string())),
        };
    }

    if pattern.contains([':', ',', ';', ' ']) {
        return Err(ProvisionError::InvalidPattern(pattern.to_string()));
    }

    let name = if pattern.is_empty() { "testsrc" } else { pattern };
    Ok(format!("{name}=size={width}x{height}:rate={fps}"))
}

/// Full generator command line writing `source` into `device` in real time
pub fn generator_args(source: &str, device: &Path) -> Vec<String> {
    vec![
        "-re".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        source.to_string(),
        "-pix_fmt".to_string(),
        "yuyv422".to_string(),
        "-f".to_string(),
        "v4l2".to_string(),
        device.display().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern() {
        assert_eq!(
            generator_source("", 640, 480, 30).unwrap(),
            "testsrc=size=640x480:rate=30"
        );
        assert_eq!(
            generator_source("testsrc", 640, 480, 30).unwrap(),
            "testsrc=size=640x480:rate=30"
        );
    }

    #[test]
    fn test_named_pattern() {
        assert_eq!(
            generator_source("smptebars", 1280, 720, 60).unwrap(),
            "smptebars=size=1280x720:rate=60"
        );
    }

    #[test]
    fn test_color_pattern() {
        assert_eq!(
            generator_source("color=red", 320, 240, 15).unwrap(),
            "color=c=red:s=320x240:r=15"
        );
    }

    #[test]
    fn test_rejected_patterns() {
        for bad in ["size=10", "color=", "testsrc:duration=5", "a b"] {
            assert!(
                matches!(
                    generator_source(bad, 640, 480, 30),
                    Err(ProvisionError::InvalidPattern(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_generator_args() {
        let args = generator_args("testsrc=size=640x480:rate=30", Path::new("/dev/video50"));
        assert_eq!(args.first().map(String::as_str), Some("-re"));
        assert_eq!(args.last().map(String::as_str), Some("/dev/video50"));
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuyv422"));
    }
}
