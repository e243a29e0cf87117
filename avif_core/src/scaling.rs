//! Scaling policy for oversized sources - 超大图片缩放策略
//!
//! Two independent limits that compose sequentially: the width rule runs first,
//! the height rule then looks at the possibly already-scaled height.

use serde::Serialize;

pub const MAX_WIDTH: u32 = 7680;
pub const MAX_HEIGHT: u32 = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleLimits {
    pub width_limit: bool,
    pub height_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleDecision {
    pub width: u32,
    pub height: u32,
    pub scaled: bool,
}

impl ScaleDecision {
    /// Target for the `-vf scale=W:H` filter, only when a rule fired.
    pub fn filter_target(&self) -> Option<(u32, u32)> {
        self.scaled.then_some((self.width, self.height))
    }
}

/// 计算目标尺寸；任一规则触发时两边都向下取偶数（编码器要求）
pub fn decide(width: u32, height: u32, limits: ScaleLimits) -> ScaleDecision {
    let (mut w, mut h) = (u64::from(width), u64::from(height));
    let mut scaled = false;

    if limits.width_limit && w > u64::from(MAX_WIDTH) {
        h = h * u64::from(MAX_WIDTH) / w;
        w = u64::from(MAX_WIDTH);
        scaled = true;
    }

    if limits.height_limit && h > u64::from(MAX_HEIGHT) {
        w = w * u64::from(MAX_HEIGHT) / h;
        h = u64::from(MAX_HEIGHT);
        scaled = true;
    }

    if !scaled {
        return ScaleDecision {
            width,
            height,
            scaled: false,
        };
    }

    // w, h only ever shrink from u32 inputs, so the casts are lossless
    ScaleDecision {
        width: round_down_even(w as u32),
        height: round_down_even(h as u32),
        scaled: true,
    }
}

fn round_down_even(v: u32) -> u32 {
    (v & !1).max(2)
}
