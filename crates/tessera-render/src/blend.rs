//! Blend mode presets for common rendering scenarios.

use tessera_test_utils::{BlendEquation, BlendFactor};

/// Blend equation and separate color/alpha factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub equation: BlendEquation,
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendState {
    /// Straight alpha, with alpha accumulated as `src.a + dst.a * (1 - src.a)`.
    pub const ALPHA_BLENDING: BlendState = BlendState {
        equation: BlendEquation::Add,
        src_rgb: BlendFactor::SrcAlpha,
        dst_rgb: BlendFactor::OneMinusSrcAlpha,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
    };

    pub const PREMULTIPLIED_ALPHA_BLENDING: BlendState = BlendState {
        equation: BlendEquation::Add,
        src_rgb: BlendFactor::One,
        dst_rgb: BlendFactor::OneMinusSrcAlpha,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
    };

    /// Same factors for color and alpha.
    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            equation: BlendEquation::Add,
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }

    pub const fn separate(
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> Self {
        Self {
            equation: BlendEquation::Add,
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        }
    }

    pub const fn with_equation(mut self, equation: BlendEquation) -> Self {
        self.equation = equation;
        self
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::ALPHA_BLENDING
    }
}

/// Predefined blend modes for common use cases.
///
/// Use these to configure how source and destination colors are combined
/// during rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending - source completely replaces destination.
    Replace,

    /// Standard alpha blending for transparent content.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb * (1 - src.a)`
    #[default]
    Alpha,

    /// Premultiplied alpha blending.
    ///
    /// Formula: `src.rgb + dst.rgb * (1 - src.a)`
    ///
    /// Use for: textures with premultiplied alpha, compositing.
    PremultipliedAlpha,

    /// Additive blending - colors are added together.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb`
    ///
    /// Use for: Glow effects, particles, light sources.
    Additive,

    /// Multiplicative blending.
    ///
    /// Formula: `src.rgb * dst.rgb`
    Multiply,

    /// Custom blend state for advanced use cases.
    Custom(BlendState),
}

impl BlendMode {
    /// Blend state for this mode; `None` means blending is disabled.
    pub fn to_blend_state(self) -> Option<BlendState> {
        match self {
            BlendMode::Replace => None,
            BlendMode::Alpha => Some(BlendState::ALPHA_BLENDING),
            BlendMode::PremultipliedAlpha => Some(BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            BlendMode::Additive => Some(BlendState::separate(
                BlendFactor::SrcAlpha,
                BlendFactor::One,
                BlendFactor::One,
                BlendFactor::One,
            )),
            BlendMode::Multiply => Some(BlendState::separate(
                BlendFactor::DstColor,
                BlendFactor::Zero,
                BlendFactor::DstAlpha,
                BlendFactor::Zero,
            )),
            BlendMode::Custom(state) => Some(state),
        }
    }
}

impl From<BlendMode> for Option<BlendState> {
    fn from(mode: BlendMode) -> Self {
        mode.to_blend_state()
    }
}

impl From<BlendState> for BlendMode {
    fn from(state: BlendState) -> Self {
        BlendMode::Custom(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_disables_blending() {
        assert_eq!(BlendMode::Replace.to_blend_state(), None);
    }

    #[test]
    fn test_default_is_alpha() {
        assert_eq!(
            BlendMode::default().to_blend_state(),
            Some(BlendState::default())
        );
    }

    #[test]
    fn test_custom_roundtrip() {
        let state = BlendState::new(BlendFactor::One, BlendFactor::One)
            .with_equation(BlendEquation::Max);
        let mode: BlendMode = state.into();
        assert_eq!(mode.to_blend_state(), Some(state));
    }
}
