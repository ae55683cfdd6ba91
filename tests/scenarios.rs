use egui::{Rect, pos2, vec2};
use image::Rgba;

use layerfe::components::tools::{BrushType, ToolProperties};
use layerfe::compositor::{CompositeOptions, compose};
use layerfe::settings::EditorSettings;
use layerfe::surface::ResampleFilter;
use layerfe::{EditError, EditorSession, SymmetryMode};

fn session(w: u32, h: u32) -> EditorSession {
    let settings = EditorSettings {
        default_width: w,
        default_height: h,
        ..Default::default()
    };
    EditorSession::new(settings).unwrap()
}

/// Background layer painted with a gradient that is unique per pixel.
fn gradient_session(w: u32, h: u32) -> EditorSession {
    let mut s = session(w, h);
    let layer = s.document.active_layer_mut().unwrap();
    for y in 0..h {
        for x in 0..w {
            layer.pixels.put_pixel(x, y, Rgba([(x * 4) as u8, (y * 4) as u8, 100, 255]));
        }
    }
    s
}

fn is_painted(s: &EditorSession, x: u32, y: u32) -> bool {
    s.document.active_pixel(x, y).is_some_and(|p| p[3] > 0)
}

#[test]
fn compose_is_pure() {
    let mut s = gradient_session(32, 24);
    s.add_layer().unwrap();
    s.pointer_down(pos2(10.0, 10.0)).unwrap();
    s.pointer_move(pos2(20.0, 12.0));
    s.pointer_up();
    let opts = CompositeOptions::default();
    let a = compose(&s.document, &opts).unwrap();
    let b = compose(&s.document, &opts).unwrap();
    assert_eq!(a, b);
    assert_eq!(s.composite_png().unwrap(), s.composite_png().unwrap());
}

#[test]
fn undo_then_redo_restores_the_composite() {
    let mut s = gradient_session(40, 40);
    let id = s.add_layer().unwrap();
    s.pointer_down(pos2(5.0, 5.0)).unwrap();
    s.pointer_move(pos2(30.0, 30.0));
    s.pointer_up();
    s.set_opacity(id, 0.4).unwrap();
    s.rotate(layerfe::ops::transform::Rotation::Cw90).unwrap();

    let before = s.composite().unwrap();
    assert!(s.undo());
    assert_ne!(s.composite().unwrap(), before);
    assert!(s.redo());
    assert_eq!(s.composite().unwrap(), before);
}

#[test]
fn history_never_exceeds_its_bound() {
    let settings = EditorSettings {
        default_width: 8,
        default_height: 8,
        max_undo_steps: 3,
        ..Default::default()
    };
    let mut s = EditorSession::new(settings).unwrap();
    for _ in 0..4 {
        s.add_layer().unwrap();
        assert!(s.history.len() <= 3);
    }
    assert_eq!(s.document.layer_count(), 5);
    assert!(s.undo());
    assert!(s.undo());
    assert!(!s.undo());
    // Oldest retained state has three layers; the original single layer is gone.
    assert_eq!(s.document.layer_count(), 3);
}

#[test]
fn crop_maps_pixels_from_the_floored_origin() {
    let mut s = gradient_session(40, 30);
    let before = s.document.clone();
    s.crop(Rect::from_min_size(pos2(5.7, 3.2), vec2(10.9, 8.5))).unwrap();
    assert_eq!((s.document.width(), s.document.height()), (10, 8));
    for j in 0..8 {
        for i in 0..10 {
            assert_eq!(s.document.active_pixel(i, j), before.active_pixel(5 + i, 3 + j));
        }
    }
}

#[test]
fn degenerate_crop_and_resize_leave_document_untouched() {
    let mut s = gradient_session(10, 10);
    let history = s.history.len();
    assert!(matches!(
        s.crop(Rect::from_min_size(pos2(1.0, 1.0), vec2(0.5, 4.0))),
        Err(EditError::InvalidGeometry { .. })
    ));
    assert!(matches!(s.resize_image(0, 5), Err(EditError::InvalidGeometry { .. })));
    assert_eq!((s.document.width(), s.document.height()), (10, 10));
    assert_eq!(s.history.len(), history);
}

#[test]
fn radial_four_paints_quarter_turns_about_the_centre() {
    let mut s = session(100, 100);
    s.brush.properties = ToolProperties {
        size: 2.0,
        symmetry: SymmetryMode::Radial(4),
        ..Default::default()
    };
    let p = pos2(70.5, 50.5);
    s.pointer_down(p).unwrap();
    s.pointer_up();

    let centre = pos2(50.0, 50.0);
    let radius = p.distance(centre);
    let expected = [pos2(70.5, 50.5), pos2(49.5, 70.5), pos2(29.5, 49.5), pos2(50.5, 29.5)];
    for q in expected {
        assert!((q.distance(centre) - radius).abs() < 1e-3);
        assert!(is_painted(&s, q.x as u32, q.y as u32), "no paint at {q:?}");
    }
    assert!(!is_painted(&s, 70, 70));
    assert!(!is_painted(&s, 50, 50));
}

#[test]
fn half_blue_over_red_is_purple() {
    let mut s = session(100, 100);
    s.document.active_layer_mut().unwrap().pixels.fill(Rgba([255, 0, 0, 255]));
    let top = s.add_layer().unwrap();
    s.document.layer_mut(top).unwrap().pixels.fill(Rgba([0, 0, 255, 255]));
    s.set_opacity(top, 0.5).unwrap();

    let out = s.composite().unwrap();
    for (x, y) in [(0, 0), (50, 50), (99, 99)] {
        let px = out.get_pixel(x, y);
        assert!((127..=128).contains(&px[0]), "{px:?}");
        assert_eq!(px[1], 0);
        assert!((127..=128).contains(&px[2]), "{px:?}");
        assert_eq!(px[3], 255);
    }
}

#[test]
fn single_dab_undoes_and_redoes() {
    let mut s = session(50, 50);
    s.brush.properties.size = 10.0;
    s.pointer_down(pos2(25.0, 25.0)).unwrap();
    s.pointer_up();
    assert!(is_painted(&s, 25, 25));
    assert_eq!(s.history.undo_description(), Some("Brush Stroke"));

    assert!(s.undo());
    assert!(s.document.layers()[0].pixels.pixels().iter().all(|&b| b == 0));
    assert!(s.redo());
    assert_eq!(s.document.active_pixel(25, 25), Some(Rgba([0, 0, 0, 255])));
}

#[test]
fn resize_round_trip_keeps_dimensions() {
    let mut s = gradient_session(100, 100);
    s.resize_image_with(50, 50, ResampleFilter::Bilinear).unwrap();
    assert_eq!((s.document.width(), s.document.height()), (50, 50));
    s.resize_image_with(100, 100, ResampleFilter::Bilinear).unwrap();
    assert_eq!((s.document.width(), s.document.height()), (100, 100));
    assert!(s.document.layers().iter().all(|l| l.pixels.dimensions() == (100, 100)));
    assert_eq!(s.composite().unwrap().dimensions(), (100, 100));
}

#[test]
fn clone_stamp_copies_the_pre_stroke_composite() {
    let mut s = gradient_session(60, 60);
    let original = s.composite().unwrap();
    s.brush.properties = ToolProperties {
        size: 1.0,
        brush_type: BrushType::Clone,
        ..Default::default()
    };
    s.set_clone_source(pos2(10.5, 10.5));
    s.pointer_down(pos2(30.5, 30.5)).unwrap();
    assert_eq!(s.brush.clone_stamp.offset, Some(vec2(-20.0, -20.0)));
    s.pointer_move(pos2(40.5, 40.5));
    s.pointer_up();

    assert_eq!(s.document.active_pixel(40, 40), Some(original.get_pixel(20, 20)));
    assert_eq!(s.document.active_pixel(30, 30), Some(original.get_pixel(10, 10)));
    assert_eq!(s.history.undo_description(), Some("Clone Stamp"));
}

#[test]
fn eraser_stroke_clears_alpha() {
    let mut s = gradient_session(20, 20);
    s.brush.properties.brush_type = BrushType::Eraser;
    s.pointer_down(pos2(10.0, 10.0)).unwrap();
    s.pointer_leave();
    assert_eq!(s.document.active_pixel(10, 10).map(|p| p[3]), Some(0));
    assert_eq!(s.history.undo_description(), Some("Eraser"));
}

#[test]
fn remote_results_install_as_fitted_layers() {
    let mut s = session(40, 20);
    let square = layerfe::io::encode_png(&layerfe::PixelSurface::filled(10, 10, Rgba([9, 9, 9, 255])).unwrap()).unwrap();
    let id = s.install_result_as_layer(&square, "result").unwrap();
    let layer = s.document.layer(id).unwrap();
    assert_eq!(layer.pixels.dimensions(), (40, 20));
    // 10×10 scaled ×2 and centred horizontally: columns 10..30.
    assert_eq!(layer.pixels.get_pixel(20, 10), Rgba([9, 9, 9, 255]));
    assert_eq!(layer.pixels.get_pixel(5, 10)[3], 0);
    assert_eq!(layer.pixels.get_pixel(35, 10)[3], 0);
    assert_eq!(s.document.active_layer_id(), Some(id));
    assert_eq!(s.history.undo_description(), Some("Insert Image"));
}
