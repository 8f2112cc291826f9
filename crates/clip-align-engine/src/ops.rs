use clip_align_types::GrayFrame;

/// Strided u8 plane to a packed f32 plane in [0, 255].
pub fn to_f32_plane(frame: &GrayFrame) -> Vec<f32> {
    let width = frame.width() as usize;
    let height = frame.height();
    let mut pixels = Vec::with_capacity(width * height as usize);
    for y in 0..height {
        pixels.extend(frame.row(y).iter().map(|&px| px as f32));
    }
    pixels
}

/// Box-filter downscale: each output pixel is the mean of the source pixels
/// its footprint covers.
pub fn resize_average(
    pixels: &[f32],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<f32> {
    assert_eq!(pixels.len(), width * height);
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return vec![0.0; new_width * new_height];
    }
    let scale_x = width as f32 / new_width as f32;
    let scale_y = height as f32 / new_height as f32;
    let mut output = vec![0.0f32; new_width * new_height];
    for ny in 0..new_height {
        let src_y0 = (ny as f32 * scale_y).floor() as isize;
        let src_y1 = (((ny + 1) as f32 * scale_y).ceil() as isize).min(height as isize);
        for nx in 0..new_width {
            let src_x0 = (nx as f32 * scale_x).floor() as isize;
            let src_x1 = (((nx + 1) as f32 * scale_x).ceil() as isize).min(width as isize);
            let mut sum = 0.0f32;
            let mut count = 0;
            for sy in src_y0.max(0)..src_y1.max(src_y0 + 1) {
                for sx in src_x0.max(0)..src_x1.max(src_x0 + 1) {
                    let idx = sy as usize * width + sx as usize;
                    sum += pixels[idx];
                    count += 1;
                }
            }
            let value = if count == 0 { 0.0 } else { sum / count as f32 };
            output[ny * new_width + nx] = value;
        }
    }
    output
}

/// Downscale `frame` so that `width * height <= max_pixels`, preserving the
/// aspect ratio. Frames already under budget come back unchanged; this never
/// upscales.
pub fn fit_to_pixel_budget(frame: &GrayFrame, max_pixels: u32) -> GrayFrame {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let pixels = width * height;
    if pixels == 0 || pixels <= max_pixels as usize {
        return frame.clone();
    }
    let scale = (max_pixels as f32 / pixels as f32).sqrt();
    let new_width = ((width as f32 * scale).floor() as usize).max(1);
    let new_height = ((height as f32 * scale).floor() as usize).max(1);

    let source = to_f32_plane(frame);
    let resized = resize_average(&source, width, height, new_width, new_height);
    let data: Vec<u8> = resized
        .iter()
        .map(|&value| value.round().clamp(0.0, 255.0) as u8)
        .collect();

    GrayFrame::from_owned(
        new_width as u32,
        new_height as u32,
        new_width,
        frame.timestamp(),
        data,
    )
    .expect("packed plane length matches dimensions")
    .with_frame_index(frame.frame_index())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, value: u8) -> GrayFrame {
        let data = vec![value; (width * height) as usize];
        GrayFrame::from_owned(width, height, width as usize, None, data).unwrap()
    }

    #[test]
    fn resize_average_preserves_flat_regions() {
        let pixels = vec![10.0f32; 8 * 8];
        let resized = resize_average(&pixels, 8, 8, 3, 3);
        assert_eq!(resized.len(), 9);
        for value in resized {
            assert!((value - 10.0).abs() < 1e-5);
        }
    }

    #[test]
    fn fit_to_pixel_budget_respects_budget_and_aspect() {
        let frame = flat_frame(160, 90, 50);
        let fitted = fit_to_pixel_budget(&frame, 1000);
        let pixels = fitted.width() * fitted.height();
        assert!(pixels <= 1000, "got {pixels} pixels");
        let original_aspect = 160.0 / 90.0;
        let new_aspect = fitted.width() as f32 / fitted.height() as f32;
        assert!((original_aspect - new_aspect).abs() < 0.2);
    }

    #[test]
    fn fit_to_pixel_budget_never_upscales() {
        let frame = flat_frame(10, 10, 5);
        let fitted = fit_to_pixel_budget(&frame, 1_000_000);
        assert_eq!(fitted.width(), 10);
        assert_eq!(fitted.height(), 10);
    }
}
