//! Sprite batch recording, replay and flush tests against the mock device.

use std::rc::Rc;

use tessera_core::geometry::Rect;
use tessera_core::math::{Affine2, Vec2};
use tessera_render::{
    BlendMode, Color, Gradient, Poly2, RenderError, Scissor, Shader, SpriteBatch,
    SpriteBatchDescriptor, SpriteVertex, StencilEffect, Texture,
};
use tessera_test_utils::{
    BufferTarget, Capability, ClearFlags, DrawMode, MockRenderDevice, PixelFormat, RenderCall,
    UniformValue,
};

fn setup(desc: SpriteBatchDescriptor) -> (Rc<MockRenderDevice>, SpriteBatch) {
    let mock = Rc::new(MockRenderDevice::new());
    let batch = SpriteBatch::new(mock.clone(), desc).unwrap();
    mock.clear_calls();
    (mock, batch)
}

fn small(vertex_capacity: usize) -> SpriteBatchDescriptor {
    SpriteBatchDescriptor {
        vertex_capacity,
        index_capacity: vertex_capacity * 3,
        ..Default::default()
    }
}

fn unit(x: f32) -> Rect<f32> {
    Rect::new(x, 0.0, 1.0, 1.0)
}

fn is_draw(call: &RenderCall) -> bool {
    matches!(call, RenderCall::DrawElements { .. })
}

#[test]
fn test_unchanged_state_is_one_draw() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    for i in 0..10 {
        batch.fill_rect(unit(i as f32)).unwrap();
    }
    batch.end().unwrap();

    assert_eq!(mock.draw_calls(), vec![(DrawMode::Triangles, 60, 0)]);
    assert_eq!(batch.stats().draw_calls, 1);
    assert_eq!(batch.stats().vertices, 40);
    assert_eq!(batch.stats().primitives, 20);
}

#[test]
fn test_state_changes_split_draws() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.fill_rect(unit(0.0)).unwrap();
    batch.set_blend_mode(BlendMode::Additive);
    batch.fill_rect(unit(1.0)).unwrap();
    batch.set_stencil_effect(StencilEffect::Clip);
    batch.fill_rect(unit(2.0)).unwrap();
    batch.end().unwrap();

    // Three contexts, each drawing the six indices after the previous one.
    assert_eq!(
        mock.draw_calls(),
        vec![
            (DrawMode::Triangles, 6, 0),
            (DrawMode::Triangles, 6, 24),
            (DrawMode::Triangles, 6, 48),
        ]
    );

    // Only the first context uploads the unchanged state.
    assert_eq!(mock.uniform_values("uPerspective").len(), 1);
    assert_eq!(mock.uniform_values("uType").len(), 1);
    assert_eq!(
        mock.count(|call| matches!(call, RenderCall::BlendFunc { .. })),
        2
    );

    let stencil_on = mock
        .position(|call| {
            matches!(
                call,
                RenderCall::SetCapability {
                    capability: Capability::StencilTest,
                    enabled: true
                }
            )
        })
        .unwrap();
    let calls = mock.calls();
    let draws: Vec<usize> = (0..calls.len()).filter(|&i| is_draw(&calls[i])).collect();
    assert!(draws[1] < stencil_on && stencil_on < draws[2]);
}

#[test]
fn test_setting_same_value_does_not_split() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.fill_rect(unit(0.0)).unwrap();
    batch.set_blend_mode(BlendMode::Alpha);
    batch.set_stencil_effect(StencilEffect::Native);
    batch.set_blur(0);
    batch.set_texture(None);
    batch.set_color(Color::GREEN);
    batch.fill_rect(unit(1.0)).unwrap();
    batch.end().unwrap();

    assert_eq!(mock.count_draw_calls(), 1);
}

#[test]
fn test_texture_switch_binds_once() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());
    let texture = Rc::new(Texture::new(mock.clone(), 4, 4, PixelFormat::Rgba, None).unwrap());
    mock.clear_calls();

    batch.begin().unwrap();
    batch.fill_rect(unit(0.0)).unwrap();
    batch.draw(&texture, unit(1.0)).unwrap();
    batch.end().unwrap();

    assert_eq!(
        mock.draw_calls(),
        vec![(DrawMode::Triangles, 6, 0), (DrawMode::Triangles, 6, 24)]
    );
    assert_eq!(mock.texture_binds(), vec![Some(texture.id())]);

    let calls = mock.calls();
    let bind = mock
        .position(|call| matches!(call, RenderCall::BindTexture { .. }))
        .unwrap();
    let draws: Vec<usize> = (0..calls.len()).filter(|&i| is_draw(&calls[i])).collect();
    assert!(draws[0] < bind && bind < draws[1]);

    let types = mock.uniform_values("uType");
    assert_eq!(types, vec![UniformValue::Int(0), UniformValue::Int(1)]);
}

#[test]
fn test_vertex_attributes() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());
    let texture = batch.blank_texture().clone();

    batch.begin().unwrap();
    batch.set_color(Color::RED);
    batch.draw(&texture, Rect::new(10.0, 20.0, 4.0, 2.0)).unwrap();
    batch.end().unwrap();

    let data = mock
        .calls()
        .into_iter()
        .find_map(|call| match call {
            RenderCall::UploadBuffer {
                target: BufferTarget::Vertex,
                data,
                ..
            } => Some(data),
            _ => None,
        })
        .unwrap();
    let vertices: Vec<SpriteVertex> = data
        .chunks_exact(SpriteVertex::STRIDE)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    assert_eq!(vertices.len(), 4);

    // The rect origin samples the top-left texel.
    assert_eq!(Vec2::from(vertices[0].position), Vec2::new(10.0, 20.0));
    assert_eq!(Vec2::from(vertices[0].texcoord), Vec2::new(0.0, 1.0));
    assert_eq!(Vec2::from(vertices[2].texcoord), Vec2::new(1.0, 0.0));
    assert_eq!(Vec2::from(vertices[2].gradcoord), Vec2::ONE);
    assert!(vertices.iter().all(|v| v.color == Color::RED.to_packed()));
}

#[test]
fn test_capacity_overflow_flushes_early() {
    let (mock, mut batch) = setup(small(8));

    batch.begin().unwrap();
    batch.fill_rect(unit(0.0)).unwrap();
    batch.fill_rect(unit(1.0)).unwrap();
    assert_eq!(mock.count_draw_calls(), 0);

    batch.fill_rect(unit(2.0)).unwrap();
    assert_eq!(mock.count_draw_calls(), 1);

    batch.end().unwrap();
    assert_eq!(
        mock.draw_calls(),
        vec![(DrawMode::Triangles, 12, 0), (DrawMode::Triangles, 6, 0)]
    );
    assert_eq!(batch.stats().flushes, 2);
}

#[test]
fn test_oversized_polygon_is_chunked() {
    let (mock, mut batch) = setup(small(8));
    let points: Vec<Vec2> = (0..12)
        .map(|i| Vec2::from_angle(i as f32 * std::f32::consts::TAU / 12.0) * 10.0)
        .collect();
    let poly = Poly2::convex_fan(&points);
    assert_eq!(poly.indices().len(), 30);

    batch.begin().unwrap();
    batch.fill_poly(&poly, Vec2::ZERO).unwrap();
    batch.end().unwrap();

    let counts: Vec<usize> = mock.draw_calls().iter().map(|(_, count, _)| *count).collect();
    assert_eq!(counts, vec![12, 12, 6]);
    assert_eq!(batch.stats().primitives, 10);
}

#[test]
fn test_outline_uses_lines() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.outline_rect(unit(0.0)).unwrap();
    batch.outline_rect(unit(1.0)).unwrap();
    batch.fill_rect(unit(2.0)).unwrap();
    batch.end().unwrap();

    assert_eq!(
        mock.draw_calls(),
        vec![(DrawMode::Lines, 16, 0), (DrawMode::Triangles, 6, 64)]
    );
}

#[test]
fn test_gradient_and_scissor_share_a_block() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());
    let gradient = Gradient::linear(Vec2::ZERO, Vec2::new(0.0, 10.0), Color::RED, Color::BLUE);
    let scissor = Scissor::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0);

    batch.begin().unwrap();
    batch.set_gradient(Some(&gradient));
    batch.set_scissor(Some(&scissor));
    batch.fill_rect(unit(0.0)).unwrap();
    batch.end().unwrap();

    assert_eq!(mock.count_draw_calls(), 1);
    assert_eq!(mock.uniform_values("uType"), vec![UniformValue::Int(6)]);
    assert_eq!(
        mock.count(|call| matches!(call, RenderCall::BindBufferRange { offset: 0, .. })),
        1
    );
    assert_eq!(mock.count_buffer_writes(BufferTarget::Uniform), 1);
}

#[test]
fn test_rotated_scissor_fringe_in_block() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());
    let transform =
        Affine2::from_angle(std::f32::consts::FRAC_PI_2) * Affine2::from_scale(Vec2::new(2.0, 1.0));
    let scissor = Scissor::with_transform(Rect::new(0.0, 0.0, 100.0, 50.0), transform, 1.0);

    batch.begin().unwrap();
    batch.set_scissor(Some(&scissor));
    batch.fill_rect(unit(0.0)).unwrap();
    batch.end().unwrap();

    let data = mock
        .calls()
        .into_iter()
        .find_map(|call| match call {
            RenderCall::WriteBuffer {
                target: BufferTarget::Uniform,
                data,
                ..
            } => Some(data),
            _ => None,
        })
        .unwrap();
    let fringe: [f32; 2] = bytemuck::pod_read_unaligned(&data[56..64]);
    assert!((fringe[0] - 2.0).abs() < 1e-5, "{:?}", fringe);
    assert!((fringe[1] - 1.0).abs() < 1e-5, "{:?}", fringe);
}

#[test]
fn test_uniform_blocks_exhausted_flushes() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor {
        block_count: 2,
        ..Default::default()
    });

    batch.begin().unwrap();
    for (i, color) in [Color::RED, Color::GREEN, Color::BLUE].into_iter().enumerate() {
        batch.set_gradient(Some(&Gradient::solid(color)));
        batch.fill_rect(unit(i as f32)).unwrap();
    }
    assert_eq!(mock.count_draw_calls(), 2);
    batch.end().unwrap();

    let offsets: Vec<usize> = mock
        .calls()
        .iter()
        .filter_map(|call| match call {
            RenderCall::BindBufferRange { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![0, 256, 0]);
    assert_eq!(mock.count_draw_calls(), 3);
}

#[test]
fn test_blur_step_scales_with_texture() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());
    let texture = Rc::new(Texture::new(mock.clone(), 4, 2, PixelFormat::Rgba, None).unwrap());

    batch.begin().unwrap();
    batch.set_blur(2);
    batch.draw(&texture, unit(0.0)).unwrap();
    batch.end().unwrap();

    assert_eq!(mock.uniform_values("uBlur"), vec![UniformValue::Vec2([0.5, 1.0])]);
    assert_eq!(mock.uniform_values("uType"), vec![UniformValue::Int(9)]);
}

#[test]
fn test_stencil_clear_without_geometry() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.clear_half_stencil(true);
    batch.clear_half_stencil(false);
    batch.end().unwrap();

    assert_eq!(mock.count_draw_calls(), 0);
    assert_eq!(
        mock.count(|call| matches!(call, RenderCall::Clear { flags } if *flags == ClearFlags::STENCIL)),
        1
    );
    assert!(mock.calls().contains(&RenderCall::StencilMask { mask: 0xFF }));
}

#[test]
fn test_stencil_clear_between_shapes() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.set_stencil_effect(StencilEffect::Stamp);
    batch.fill_rect(unit(0.0)).unwrap();
    batch.clear_stencil();
    batch.fill_rect(unit(1.0)).unwrap();
    batch.end().unwrap();

    let calls = mock.calls();
    let clear = mock
        .position(|call| matches!(call, RenderCall::Clear { .. }))
        .unwrap();
    let draws: Vec<usize> = (0..calls.len()).filter(|&i| is_draw(&calls[i])).collect();
    assert_eq!(draws.len(), 2);
    assert!(draws[0] < clear && clear < draws[1]);

    // The effect is re-applied after the clear changed the write mask.
    let restamp = calls[clear..]
        .iter()
        .position(|call| matches!(call, RenderCall::StencilFunc { .. }));
    assert!(restamp.is_some());
}

#[test]
fn test_frame_errors() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    assert_eq!(batch.fill_rect(unit(0.0)), Err(RenderError::NotDrawing));
    assert_eq!(batch.flush(), Err(RenderError::NotDrawing));
    assert_eq!(batch.end(), Err(RenderError::NotDrawing));

    batch.begin().unwrap();
    assert_eq!(batch.begin(), Err(RenderError::AlreadyDrawing));

    let shader = Rc::new(Shader::sprite(mock.clone()).unwrap());
    assert_eq!(
        batch.set_shader(shader.clone()),
        Err(RenderError::ShaderLocked)
    );
    batch.end().unwrap();

    batch.set_shader(shader.clone()).unwrap();
    assert!(Rc::ptr_eq(batch.shader(), &shader));
}

#[test]
fn test_end_restores_state() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.fill_rect(unit(0.0)).unwrap();
    batch.end().unwrap();

    let calls = mock.calls();
    let last_draw = calls.iter().rposition(is_draw).unwrap();
    let tail = &calls[last_draw..];
    assert!(tail.contains(&RenderCall::SetCapability {
        capability: Capability::Blend,
        enabled: false
    }));
    assert!(tail.contains(&RenderCall::DepthMask { enabled: true }));
    assert!(tail.contains(&RenderCall::SetCapability {
        capability: Capability::StencilTest,
        enabled: false
    }));
    assert_eq!(calls.last(), Some(&RenderCall::UseProgram { program: None }));
    assert!(!batch.is_drawing());
}

#[test]
fn test_end_disables_blending_after_trailing_change() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());

    batch.begin().unwrap();
    batch.fill_rect(unit(0.0)).unwrap();
    batch.set_blending(false);
    batch.end().unwrap();

    let last_blend = mock
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                RenderCall::SetCapability {
                    capability: Capability::Blend,
                    ..
                }
            )
        })
        .last();
    assert_eq!(
        last_blend,
        Some(RenderCall::SetCapability {
            capability: Capability::Blend,
            enabled: false
        })
    );
    assert_eq!(mock.count_draw_calls(), 1);
}

#[test]
fn test_state_survives_between_frames() {
    let (mock, mut batch) = setup(SpriteBatchDescriptor::default());
    batch.set_blend_mode(BlendMode::Multiply);

    for _ in 0..2 {
        batch.begin().unwrap();
        batch.fill_rect(unit(0.0)).unwrap();
        batch.end().unwrap();
    }

    // Every frame starts fully dirty, so the blend function is re-sent.
    assert_eq!(
        mock.count(|call| matches!(call, RenderCall::BlendFunc { .. })),
        2
    );
    assert_eq!(batch.blend_state(), BlendMode::Multiply.to_blend_state().unwrap());
}

#[test]
fn test_new_releases_resources_on_failure() {
    let mut succeeded = false;
    for budget in 0..16 {
        let mock = Rc::new(MockRenderDevice::new());
        mock.fail_allocations_after(budget);

        match SpriteBatch::new(mock.clone(), SpriteBatchDescriptor::default()) {
            Ok(batch) => {
                drop(batch);
                assert_eq!(mock.live_resources(), 0);
                succeeded = true;
                break;
            }
            Err(err) => {
                assert!(matches!(err, RenderError::Device(_)), "budget {budget}: {err}");
                assert_eq!(mock.live_resources(), 0, "budget {budget} leaked");
            }
        }
    }
    assert!(succeeded);
}

#[test]
fn test_rejects_tiny_capacity() {
    let mock = Rc::new(MockRenderDevice::new());
    let result = SpriteBatch::new(mock, small(2));
    assert!(matches!(
        result,
        Err(RenderError::CapacityExceeded { what: "vertex", .. })
    ));
}
