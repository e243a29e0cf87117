//! FFmpeg argument builder for AVIF encodes - 编码命令构建
//!
//! Command shape: `-i <input> -y [-vf scale=W:H] <codec-args> <output>`

use std::ffi::OsString;
use std::fmt;
use std::path::Path;

/// Ordered encoder strategies; a run tries them in order until one exits 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStrategy {
    /// NVENC hardware AV1
    Gpu,
    /// libaom software AV1, all-intra
    Cpu,
}

impl EncodeStrategy {
    pub fn codec_name(self) -> &'static str {
        match self {
            EncodeStrategy::Gpu => "av1_nvenc",
            EncodeStrategy::Cpu => "libaom-av1",
        }
    }
}

impl fmt::Display for EncodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeStrategy::Gpu => write!(f, "GPU ({})", self.codec_name()),
            EncodeStrategy::Cpu => write!(f, "CPU ({})", self.codec_name()),
        }
    }
}

/// GPU 优先，失败后回退 CPU
pub fn strategies_for(use_gpu: bool) -> &'static [EncodeStrategy] {
    if use_gpu {
        &[EncodeStrategy::Gpu, EncodeStrategy::Cpu]
    } else {
        &[EncodeStrategy::Cpu]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: u8,
    pub speed: u8,
    pub scale: Option<(u32, u32)>,
}

pub fn codec_args(strategy: EncodeStrategy, params: &EncodeParams) -> Vec<String> {
    match strategy {
        EncodeStrategy::Gpu => vec![
            "-c:v".into(),
            strategy.codec_name().into(),
            "-cq".into(),
            params.quality.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-preset".into(),
            "p6".into(),
        ],
        EncodeStrategy::Cpu => vec![
            "-c:v".into(),
            strategy.codec_name().into(),
            "-crf".into(),
            params.quality.to_string(),
            "-cpu-used".into(),
            params.speed.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-g".into(),
            "1".into(),
        ],
    }
}

/// Full argument list (without the program name).
pub fn build_args(
    strategy: EncodeStrategy,
    input: &Path,
    output: &Path,
    params: &EncodeParams,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.as_os_str().to_os_string(), "-y".into()];

    if let Some((w, h)) = params.scale {
        args.push("-vf".into());
        args.push(format!("scale={}:{}", w, h).into());
    }

    args.extend(codec_args(strategy, params).into_iter().map(OsString::from));
    args.push(output.as_os_str().to_os_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_cpu_args_exact() {
        let params = EncodeParams {
            quality: 25,
            speed: 5,
            scale: None,
        };
        let args = build_args(
            EncodeStrategy::Cpu,
            Path::new("in.png"),
            Path::new("out.avif"),
            &params,
        );
        assert_eq!(
            strs(&args),
            vec![
                "-i", "in.png", "-y", "-c:v", "libaom-av1", "-crf", "25", "-cpu-used", "5",
                "-pix_fmt", "yuv420p", "-g", "1", "out.avif"
            ]
        );
    }

    #[test]
    fn test_gpu_args_with_scale_filter_before_codec() {
        let params = EncodeParams {
            quality: 30,
            speed: 9,
            scale: Some((7500, 6000)),
        };
        let args = strs(&build_args(
            EncodeStrategy::Gpu,
            Path::new("big.jpg"),
            Path::new("big.avif"),
            &params,
        ));
        assert_eq!(
            args,
            vec![
                "-i",
                "big.jpg",
                "-y",
                "-vf",
                "scale=7500:6000",
                "-c:v",
                "av1_nvenc",
                "-cq",
                "30",
                "-pix_fmt",
                "yuv420p",
                "-preset",
                "p6",
                "big.avif"
            ]
        );
        // speed 只影响 CPU 路径
        assert!(!args.contains(&"9".to_string()));
    }

    #[test]
    fn test_cpu_fallback_keeps_scale_filter() {
        let params = EncodeParams {
            quality: 25,
            speed: 5,
            scale: Some((7680, 4320)),
        };
        let args = strs(&build_args(
            EncodeStrategy::Cpu,
            Path::new("a.png"),
            Path::new("a.avif"),
            &params,
        ));
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        let codec = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(vf < codec);
        assert_eq!(args[vf + 1], "scale=7680:4320");
    }

    #[test]
    fn test_strategy_order() {
        assert_eq!(
            strategies_for(true),
            &[EncodeStrategy::Gpu, EncodeStrategy::Cpu]
        );
        assert_eq!(strategies_for(false), &[EncodeStrategy::Cpu]);
    }
}
