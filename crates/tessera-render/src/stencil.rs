//! Stencil effects.
//!
//! The 8-bit stencil buffer is split into two 4-bit halves so two stamps can
//! coexist: the lower half (`0x0F`) and the upper half (`0xF0`). Stamping
//! inverts the bits of a half, so overlapping stamps cancel (even-odd fill).
//!
//! Each [`StencilEffect`] is a fixed mapping to stencil test, stencil write
//! and color write state. `Clip`, `Mask`, `Fill` and `Wipe` test or erase
//! the unified region of both halves, matching their `*Join` forms, while
//! `Stamp`, `Carve` and `Clamp` write the lower half. `None*` effects act on
//! the upper half. Compound effects combine a policy for the lower half with
//! one for the upper half, such as [`StencilEffect::ClipMask`] (inside the
//! lower stamp and outside the upper).

use tessera_test_utils::{Capability, ClearFlags, CompareFunction, RenderDevice, StencilOp};

const LOWER: u32 = 0x0F;
const UPPER: u32 = 0xF0;
const BOTH: u32 = 0xFF;

/// Concrete stencil and color-write state for one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Whether the stencil test is enabled at all.
    pub test: bool,
    pub color_write: bool,
    /// Stencil bits that may be written.
    pub write_mask: u32,
    pub func: CompareFunction,
    pub reference: i32,
    pub compare_mask: u32,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilState {
    const DISABLED: StencilState = StencilState {
        test: false,
        color_write: true,
        write_mask: BOTH,
        func: CompareFunction::Always,
        reference: 0,
        compare_mask: BOTH,
        fail: StencilOp::Keep,
        depth_fail: StencilOp::Keep,
        pass: StencilOp::Keep,
    };

    /// Read-only test `stencil & mask <func> reference & mask`.
    const fn test(func: CompareFunction, reference: u32, mask: u32) -> Self {
        StencilState {
            test: true,
            color_write: true,
            write_mask: 0,
            func,
            reference: reference as i32,
            compare_mask: mask,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }

    const fn always() -> Self {
        Self::test(CompareFunction::Always, 0, BOTH)
    }

    const fn not_equal(reference: u32, mask: u32) -> Self {
        Self::test(CompareFunction::NotEqual, reference, mask)
    }

    const fn equal(reference: u32, mask: u32) -> Self {
        Self::test(CompareFunction::Equal, reference, mask)
    }

    /// Apply `op` to the `mask` bits of fragments that pass.
    const fn write(mut self, op: StencilOp, mask: u32) -> Self {
        self.pass = op;
        self.write_mask = mask;
        self
    }

    const fn zero(self, mask: u32) -> Self {
        self.write(StencilOp::Zero, mask)
    }

    const fn invert(self, mask: u32) -> Self {
        self.write(StencilOp::Invert, mask)
    }

    const fn hidden(mut self) -> Self {
        self.color_write = false;
        self
    }
}

/// Named stencil configurations for drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilEffect {
    /// Leave stencil state to the caller.
    #[default]
    Native,
    /// Disable the stencil test.
    None,

    /// Draw inside either stamp.
    Clip,
    /// Draw outside both stamps.
    Mask,
    /// Draw inside either stamp, erasing both as it draws.
    Fill,
    /// Erase both halves without drawing.
    Wipe,
    /// Stamp the lower half without drawing.
    Stamp,
    /// Stamp the lower half outside the existing lower stamp, without drawing.
    Carve,
    /// Draw and stamp the lower half, never drawing twice on one pixel.
    Clamp,

    /// Draw inside the upper stamp.
    NoneClip,
    /// Draw outside the upper stamp.
    NoneMask,
    /// Draw inside the upper stamp, erasing it.
    NoneFill,
    /// Erase the upper half without drawing.
    NoneWipe,
    /// Stamp the upper half without drawing.
    NoneStamp,
    /// Stamp the upper half outside the existing upper stamp.
    NoneCarve,
    /// Draw and stamp the upper half, never drawing twice on one pixel.
    NoneClamp,

    /// Draw inside the union of both stamps.
    ClipJoin,
    /// Draw inside the intersection of both stamps.
    ClipMeet,
    /// Draw inside the lower stamp, ignoring the upper.
    ClipNone,
    /// Draw inside the lower stamp and outside the upper.
    ClipMask,
    /// Draw inside both stamps, erasing the upper.
    ClipFill,
    /// Erase the upper half inside the lower stamp.
    ClipWipe,
    /// Stamp the upper half inside the lower stamp.
    ClipStamp,
    /// Stamp the upper half inside the lower stamp and outside the upper.
    ClipCarve,
    /// As `ClipCarve`, drawing as it stamps.
    ClipClamp,

    /// Draw outside both stamps.
    MaskJoin,
    /// Draw outside the intersection of both stamps.
    MaskMeet,
    /// Draw outside the lower stamp, ignoring the upper.
    MaskNone,
    /// Draw outside the lower stamp and inside the upper.
    MaskClip,
    /// Draw outside the lower stamp and inside the upper, erasing the upper.
    MaskFill,
    /// Erase the upper half outside the lower stamp.
    MaskWipe,
    /// Stamp the upper half outside the lower stamp.
    MaskStamp,
    /// Stamp the upper half outside both stamps.
    MaskCarve,
    /// As `MaskCarve`, drawing as it stamps.
    MaskClamp,

    /// Draw inside either stamp, erasing both.
    FillJoin,
    /// Draw inside both stamps, erasing both.
    FillMeet,
    /// Draw inside the lower stamp, erasing it and ignoring the upper.
    FillNone,
    /// Draw inside the lower stamp and outside the upper, erasing the lower.
    FillMask,
    /// Draw inside both stamps, erasing the lower.
    FillClip,

    /// Erase the lower half everywhere.
    WipeNone,
    /// Erase the lower half outside the upper stamp.
    WipeMask,
    /// Erase the lower half inside the upper stamp.
    WipeClip,

    /// Stamp the lower half, ignoring the upper.
    StampNone,
    /// Stamp the lower half inside the upper stamp.
    StampClip,
    /// Stamp the lower half outside the upper stamp.
    StampMask,
    /// Stamp both halves.
    StampBoth,

    /// Stamp the lower half outside the lower stamp.
    CarveNone,
    /// Stamp the lower half inside the upper stamp and outside the lower.
    CarveClip,
    /// Stamp the lower half outside both stamps.
    CarveMask,
    /// Stamp both halves outside both stamps.
    CarveBoth,

    /// Draw and stamp the lower half outside the lower stamp.
    ClampNone,
    /// As `ClampNone`, restricted to the upper stamp.
    ClampClip,
    /// As `ClampNone`, restricted to outside the upper stamp.
    ClampMask,
}

impl StencilEffect {
    /// Every effect, in declaration order.
    pub const ALL: [StencilEffect; 53] = {
        use StencilEffect::*;
        [
            Native, None, Clip, Mask, Fill, Wipe, Stamp, Carve, Clamp, NoneClip, NoneMask,
            NoneFill, NoneWipe, NoneStamp, NoneCarve, NoneClamp, ClipJoin, ClipMeet, ClipNone,
            ClipMask, ClipFill, ClipWipe, ClipStamp, ClipCarve, ClipClamp, MaskJoin, MaskMeet,
            MaskNone, MaskClip, MaskFill, MaskWipe, MaskStamp, MaskCarve, MaskClamp, FillJoin,
            FillMeet, FillNone, FillMask, FillClip, WipeNone, WipeMask, WipeClip, StampNone,
            StampClip, StampMask, StampBoth, CarveNone, CarveClip, CarveMask, CarveBoth,
            ClampNone, ClampClip, ClampMask,
        ]
    };

    /// GL state for this effect; `None` for [`StencilEffect::Native`].
    pub const fn state(self) -> Option<StencilState> {
        use StencilState as S;
        let state = match self {
            StencilEffect::Native => return Option::None,
            StencilEffect::None => S::DISABLED,

            StencilEffect::Clip => S::not_equal(0, BOTH),
            StencilEffect::Mask => S::equal(0, BOTH),
            StencilEffect::Fill => S::not_equal(0, BOTH).zero(BOTH),
            StencilEffect::Wipe => S::always().zero(BOTH).hidden(),
            StencilEffect::Stamp => S::always().invert(LOWER).hidden(),
            StencilEffect::Carve => S::equal(0, LOWER).invert(LOWER).hidden(),
            StencilEffect::Clamp => S::equal(0, LOWER).invert(LOWER),

            StencilEffect::NoneClip => S::not_equal(0, UPPER),
            StencilEffect::NoneMask => S::equal(0, UPPER),
            StencilEffect::NoneFill => S::not_equal(0, UPPER).zero(UPPER),
            StencilEffect::NoneWipe => S::always().zero(UPPER).hidden(),
            StencilEffect::NoneStamp => S::always().invert(UPPER).hidden(),
            StencilEffect::NoneCarve => S::equal(0, UPPER).invert(UPPER).hidden(),
            StencilEffect::NoneClamp => S::equal(0, UPPER).invert(UPPER),

            StencilEffect::ClipJoin => S::not_equal(0, BOTH),
            StencilEffect::ClipMeet => S::equal(BOTH, BOTH),
            StencilEffect::ClipNone => S::not_equal(0, LOWER),
            StencilEffect::ClipMask => S::equal(LOWER, BOTH),
            StencilEffect::ClipFill => S::equal(BOTH, BOTH).zero(UPPER),
            StencilEffect::ClipWipe => S::not_equal(0, LOWER).zero(UPPER).hidden(),
            StencilEffect::ClipStamp => S::not_equal(0, LOWER).invert(UPPER).hidden(),
            StencilEffect::ClipCarve => S::equal(LOWER, BOTH).invert(UPPER).hidden(),
            StencilEffect::ClipClamp => S::equal(LOWER, BOTH).invert(UPPER),

            StencilEffect::MaskJoin => S::equal(0, BOTH),
            StencilEffect::MaskMeet => S::not_equal(BOTH, BOTH),
            StencilEffect::MaskNone => S::equal(0, LOWER),
            StencilEffect::MaskClip => S::equal(UPPER, BOTH),
            StencilEffect::MaskFill => S::equal(UPPER, BOTH).zero(UPPER),
            StencilEffect::MaskWipe => S::equal(0, LOWER).zero(UPPER).hidden(),
            StencilEffect::MaskStamp => S::equal(0, LOWER).invert(UPPER).hidden(),
            StencilEffect::MaskCarve => S::equal(0, BOTH).invert(UPPER).hidden(),
            StencilEffect::MaskClamp => S::equal(0, BOTH).invert(UPPER),

            StencilEffect::FillJoin => S::not_equal(0, BOTH).zero(BOTH),
            StencilEffect::FillMeet => S::equal(BOTH, BOTH).zero(BOTH),
            StencilEffect::FillNone => S::not_equal(0, LOWER).zero(LOWER),
            StencilEffect::FillMask => S::equal(LOWER, BOTH).zero(LOWER),
            StencilEffect::FillClip => S::equal(BOTH, BOTH).zero(LOWER),

            StencilEffect::WipeNone => S::always().zero(LOWER).hidden(),
            StencilEffect::WipeMask => S::equal(0, UPPER).zero(LOWER).hidden(),
            StencilEffect::WipeClip => S::not_equal(0, UPPER).zero(LOWER).hidden(),

            StencilEffect::StampNone => S::always().invert(LOWER).hidden(),
            StencilEffect::StampClip => S::not_equal(0, UPPER).invert(LOWER).hidden(),
            StencilEffect::StampMask => S::equal(0, UPPER).invert(LOWER).hidden(),
            StencilEffect::StampBoth => S::always().invert(BOTH).hidden(),

            StencilEffect::CarveNone => S::equal(0, LOWER).invert(LOWER).hidden(),
            StencilEffect::CarveClip => S::equal(UPPER, BOTH).invert(LOWER).hidden(),
            StencilEffect::CarveMask => S::equal(0, BOTH).invert(LOWER).hidden(),
            StencilEffect::CarveBoth => S::equal(0, BOTH).invert(BOTH).hidden(),

            StencilEffect::ClampNone => S::equal(0, LOWER).invert(LOWER),
            StencilEffect::ClampClip => S::equal(UPPER, BOTH).invert(LOWER),
            StencilEffect::ClampMask => S::equal(0, BOTH).invert(LOWER),
        };
        Some(state)
    }

    /// Configure `device` for this effect. [`StencilEffect::Native`] changes
    /// nothing.
    pub fn apply(self, device: &dyn RenderDevice) {
        let Some(state) = self.state() else {
            return;
        };

        if state.test {
            device.set_capability(Capability::StencilTest, true);
            device.stencil_func(state.func, state.reference, state.compare_mask);
            device.stencil_op(state.fail, state.depth_fail, state.pass);
            device.stencil_mask(state.write_mask);
        } else {
            device.set_capability(Capability::StencilTest, false);
        }
        device.color_mask([state.color_write; 4]);
    }
}

/// A half (or all) of the stencil buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilRegion {
    Lower,
    Upper,
    Both,
}

impl StencilRegion {
    pub const fn mask(self) -> u32 {
        match self {
            StencilRegion::Lower => LOWER,
            StencilRegion::Upper => UPPER,
            StencilRegion::Both => BOTH,
        }
    }

    /// Region covering both `self` and `other`.
    pub fn union(self, other: StencilRegion) -> StencilRegion {
        if self == other {
            self
        } else {
            StencilRegion::Both
        }
    }
}

/// Zero the stencil bits of `region`, leaving the other half untouched.
pub fn clear_buffer(device: &dyn RenderDevice, region: StencilRegion) {
    device.stencil_mask(region.mask());
    device.clear_stencil(0);
    device.clear(ClearFlags::STENCIL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_test_utils::{MockRenderDevice, RenderCall};

    fn name(effect: StencilEffect) -> String {
        format!("{:?}", effect)
    }

    #[test]
    fn test_only_native_is_stateless() {
        for effect in StencilEffect::ALL {
            assert_eq!(effect.state().is_none(), effect == StencilEffect::Native);
        }
    }

    #[test]
    fn test_all_is_unique() {
        let mut seen = std::collections::HashSet::new();
        assert!(StencilEffect::ALL.iter().all(|e| seen.insert(*e)));
    }

    #[test]
    fn test_stamping_effects_hide_color() {
        for effect in StencilEffect::ALL {
            let Some(state) = effect.state() else { continue };
            let n = name(effect);
            let stamps = ["Wipe", "Stamp", "Carve"].iter().any(|p| n.contains(p));
            assert_eq!(!state.color_write, stamps, "{}", n);
        }
    }

    #[test]
    fn test_read_only_effects_write_nothing() {
        use StencilEffect::*;
        for effect in [Clip, Mask, ClipJoin, ClipMeet, ClipNone, ClipMask, MaskJoin, MaskMeet, MaskNone, MaskClip, NoneClip, NoneMask] {
            let state = effect.state().unwrap();
            assert_eq!(state.write_mask, 0, "{:?}", effect);
            assert_eq!(state.pass, StencilOp::Keep);
        }
    }

    #[test]
    fn test_upper_effects_stay_in_upper_half() {
        use StencilEffect::*;
        for effect in [NoneFill, NoneWipe, NoneStamp, NoneCarve, NoneClamp, ClipFill, ClipStamp, MaskStamp, MaskClamp] {
            assert_eq!(effect.state().unwrap().write_mask, 0xF0, "{:?}", effect);
        }
        for effect in [Stamp, Carve, Clamp, StampNone, CarveClip, ClampMask, WipeNone] {
            assert_eq!(effect.state().unwrap().write_mask, 0x0F, "{:?}", effect);
        }
    }

    #[test]
    fn test_simple_effects_use_unified_region() {
        use StencilEffect::*;
        assert_eq!(Clip.state(), ClipJoin.state());
        assert_eq!(Mask.state(), MaskJoin.state());
        assert_eq!(Fill.state(), FillJoin.state());
        assert_ne!(Clip.state(), ClipNone.state());

        let wipe = Wipe.state().unwrap();
        assert_eq!(wipe.write_mask, 0xFF);
        assert_eq!(wipe.pass, StencilOp::Zero);
    }

    #[test]
    fn test_apply_clip() {
        let mock = MockRenderDevice::new();
        StencilEffect::Clip.apply(&mock);

        assert_eq!(
            mock.calls(),
            vec![
                RenderCall::SetCapability {
                    capability: Capability::StencilTest,
                    enabled: true
                },
                RenderCall::StencilFunc {
                    func: CompareFunction::NotEqual,
                    reference: 0,
                    mask: 0xFF
                },
                RenderCall::StencilOp {
                    fail: StencilOp::Keep,
                    depth_fail: StencilOp::Keep,
                    pass: StencilOp::Keep
                },
                RenderCall::StencilMask { mask: 0 },
                RenderCall::ColorMask { mask: [true; 4] },
            ]
        );
    }

    #[test]
    fn test_apply_native_and_none() {
        let mock = MockRenderDevice::new();
        StencilEffect::Native.apply(&mock);
        assert_eq!(mock.call_count(), 0);

        StencilEffect::None.apply(&mock);
        assert_eq!(
            mock.calls()[0],
            RenderCall::SetCapability {
                capability: Capability::StencilTest,
                enabled: false
            }
        );
    }

    #[test]
    fn test_clear_half() {
        let mock = MockRenderDevice::new();
        clear_buffer(&mock, StencilRegion::Upper);
        assert_eq!(
            mock.calls(),
            vec![
                RenderCall::StencilMask { mask: 0xF0 },
                RenderCall::ClearStencil { value: 0 },
                RenderCall::Clear {
                    flags: ClearFlags::STENCIL
                },
            ]
        );
        assert_eq!(StencilRegion::Lower.union(StencilRegion::Upper), StencilRegion::Both);
    }
}
