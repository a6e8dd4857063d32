// Frame preprocessing
// Decode -> RGB -> (augment) -> resize -> [0,1] floats in CHW layout. Sequences stack along channels.

use std::path::Path;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::morphology::open;
use ndarray::{concatenate, Array3, ArrayView2, ArrayView3, Axis};
use rand::Rng;

use crate::config::ImageConfig;
use crate::constants::*;
use crate::error::{CourtsideError, Result};

/// Dense image data, shape `(channels, height, width)`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Array3<f32>,
}

impl ImageTensor {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self { data: Array3::zeros((channels, height, width)) }
    }

    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn channel(&self, c: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), c)
    }
}

fn from_rgb(rgb: &RgbImage) -> ImageTensor {
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    ImageTensor::new(Array3::from_shape_fn((IMG_CHANNELS, h, w), |(c, y, x)| {
        f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0
    }))
}

/// One random draw of the training-time augmentations.
/// The default value changes nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Augmentation {
    pub flip: bool,
    /// Hue (8-bit HSV scale) painted over clay court pixels
    pub court_hue: Option<u8>,
    /// Per-corner shifts in [-1, 1], scaled by the maximum keystone shift.
    /// Corners run top-left, top-right, bottom-right, bottom-left.
    pub keystone: Option<[(f32, f32); 4]>,
}

impl Augmentation {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let flip = rng.gen_bool(FLIP_PROBABILITY);
        let court_hue = rng
            .gen_bool(COURT_SWAP_PROBABILITY)
            .then(|| COURT_TARGET_HUES[rng.gen_range(0..COURT_TARGET_HUES.len())]);
        let keystone = rng.gen_bool(KEYSTONE_PROBABILITY).then(|| {
            let mut shifts = [(0.0, 0.0); 4];
            for corner in shifts.iter_mut() {
                *corner = (rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
            }
            shifts
        });
        Self { flip, court_hue, keystone }
    }

    /// Flip, then court colour, then keystone
    pub fn apply(&self, rgb: RgbImage) -> RgbImage {
        let mut img = rgb;
        if self.flip {
            img = imageops::flip_horizontal(&img);
        }
        if let Some(hue) = self.court_hue {
            img = court_colour_swap(&img, hue);
        }
        if let Some(shifts) = &self.keystone {
            img = keystone(&img, shifts);
        }
        img
    }
}

/// RGB to 8-bit HSV with hue in 0..180
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let v = r.max(g).max(b);
    let delta = v - r.min(g).min(b);
    let s = if v > 0.0 { delta / v * 255.0 } else { 0.0 };

    let mut degrees = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if degrees < 0.0 {
        degrees += 360.0;
    }

    let h = ((degrees / 2.0).round() as u16 % 180) as u8;
    [h, s.round() as u8, v as u8]
}

pub fn hsv_to_rgb([h, s, v]: [u8; 3]) -> [u8; 3] {
    let v = f32::from(v);
    let chroma = v * f32::from(s) / 255.0;
    let sector = (f32::from(h) * 2.0 % 360.0) / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = v - chroma;
    let channel = |c: f32| (c + m).round().clamp(0.0, 255.0) as u8;
    [channel(r), channel(g), channel(b)]
}

fn is_clay([h, s, v]: [u8; 3]) -> bool {
    h <= CLAY_HUE_MAX && s >= CLAY_MIN_SATURATION && v >= CLAY_MIN_VALUE
}

/// Repaint clay-coloured court pixels with `hue`. The clay mask is cleaned with a 3x3 opening
/// so isolated pixels keep their colour.
pub fn court_colour_swap(img: &RgbImage, hue: u8) -> RgbImage {
    let (w, h) = img.dimensions();
    let hsv: Vec<[u8; 3]> = img.pixels().map(|p| rgb_to_hsv(p.0)).collect();
    let at = |x: u32, y: u32| hsv[(y * w + x) as usize];

    let mask = GrayImage::from_fn(w, h, |x, y| Luma([if is_clay(at(x, y)) { 255 } else { 0 }]));
    let mask = open(&mask, Norm::LInf, 1);

    RgbImage::from_fn(w, h, |x, y| {
        if mask.get_pixel(x, y)[0] == 255 {
            let [_, s, v] = at(x, y);
            Rgb(hsv_to_rgb([hue, s, v]))
        } else {
            *img.get_pixel(x, y)
        }
    })
}

/// Mirror index `i` into `0..len` without repeating the edge pixel
fn reflect_101(i: i64, len: u32) -> u32 {
    let n = i64::from(len);
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    (if m < n { m } else { period - m }) as u32
}

fn reflect_pad(img: &RgbImage, pad_x: u32, pad_y: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    RgbImage::from_fn(w + 2 * pad_x, h + 2 * pad_y, |x, y| {
        *img.get_pixel(
            reflect_101(i64::from(x) - i64::from(pad_x), w),
            reflect_101(i64::from(y) - i64::from(pad_y), h),
        )
    })
}

/// Random perspective tilt: reflect-pad, move each corner of the padded frame, warp,
/// and crop the centre back to the input size
pub fn keystone(img: &RgbImage, shifts: &[(f32, f32); 4]) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let pad_x = (w as f32 * KEYSTONE_PAD_FRACTION) as u32;
    let pad_y = (h as f32 * KEYSTONE_PAD_FRACTION) as u32;
    let padded = reflect_pad(img, pad_x, pad_y);
    let (pw, ph) = padded.dimensions();

    let ratio = KEYSTONE_MAX_DEGREES.to_radians().tan();
    let (max_x, max_y) = ((pw as f32 * ratio).trunc(), (ph as f32 * ratio).trunc());
    let (right, bottom) = ((pw - 1) as f32, (ph - 1) as f32);
    let corners = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];

    let mut moved = corners;
    for (corner, &(sx, sy)) in moved.iter_mut().zip(shifts) {
        corner.0 += (sx.clamp(-1.0, 1.0) * max_x).round();
        corner.1 += (sy.clamp(-1.0, 1.0) * max_y).round();
    }

    let Some(projection) = Projection::from_control_points(corners, moved) else {
        log::warn!("Degenerate keystone corners {:?}; keeping frame unwarped", moved);
        return img.clone();
    };
    let warped = warp(&padded, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]));
    imageops::crop_imm(&warped, pw / 2 - w / 2, ph / 2 - h / 2, w, h).to_image()
}

/// Decode and preprocess one frame
pub fn load_frame(path: &Path, size: ImageConfig) -> Result<ImageTensor> {
    load_frame_augmented(path, size, &Augmentation::default())
}

/// Decode one frame, augment it at full resolution, then resize
pub fn load_frame_augmented(path: &Path, size: ImageConfig, augmentation: &Augmentation) -> Result<ImageTensor> {
    let rgb = augmentation.apply(image::open(path)?.to_rgb8());
    let resized = if rgb.width() == size.width && rgb.height() == size.height {
        rgb
    } else {
        imageops::resize(&rgb, size.width, size.height, FilterType::Triangle)
    };
    Ok(from_rgb(&resized))
}

/// Zero image of the model input size
pub fn blank(size: ImageConfig) -> ImageTensor {
    ImageTensor::zeros(IMG_CHANNELS, size.height as usize, size.width as usize)
}

/// Concatenate images along the channel axis. All parts must share height and width.
pub fn stack(parts: &[ImageTensor]) -> Result<ImageTensor> {
    let first = parts
        .first()
        .ok_or_else(|| CourtsideError::Other("cannot stack an empty sequence".to_string()))?;
    let (height, width) = (first.height(), first.width());

    if let Some(odd) = parts.iter().find(|p| p.height() != height || p.width() != width) {
        return Err(CourtsideError::Other(format!(
            "cannot stack {}x{} image onto {}x{}",
            odd.width(), odd.height(), width, height
        )));
    }

    let views: Vec<ArrayView3<'_, f32>> = parts.iter().map(|p| p.data.view()).collect();
    let data = concatenate(Axis(0), &views).map_err(|e| CourtsideError::Other(e.to_string()))?;
    Ok(ImageTensor::new(data))
}

/// A stacked sequence plus which of its frames actually decoded
#[derive(Debug, Clone)]
pub struct DecodedSequence {
    pub tensor: ImageTensor,
    pub decoded: Vec<bool>,
}

impl DecodedSequence {
    pub fn blank_count(&self) -> usize {
        self.decoded.iter().filter(|ok| !**ok).count()
    }
}

/// Load and stack the frames of a sequence under one augmentation draw.
/// Unreadable frames become zero images.
pub fn load_sequence<P: AsRef<Path>>(paths: &[P], size: ImageConfig, augmentation: &Augmentation) -> Result<DecodedSequence> {
    let mut frames = Vec::with_capacity(paths.len());
    let mut decoded = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match load_frame_augmented(path, size, augmentation) {
            Ok(t) => {
                frames.push(t);
                decoded.push(true);
            }
            Err(e) => {
                log::warn!("Failed to read frame {}: {}; using blank image", path.display(), e);
                frames.push(blank(size));
                decoded.push(false);
            }
        }
    }
    Ok(DecodedSequence { tensor: stack(&frames)?, decoded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> std::path::PathBuf {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb(f(x, y)));
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_load_frame_layout_and_scale() {
        let dir = TempDir::new().unwrap();
        let path = write_png(dir.path(), "frame_0001.png", 4, 2, |x, _| if x == 0 { [255, 0, 0] } else { [0, 0, 255] });

        let t = load_frame(&path, ImageConfig { width: 4, height: 2 }).unwrap();
        assert_eq!(t.data.dim(), (3, 2, 4));
        assert_eq!(t.data[[0, 0, 0]], 1.0);
        assert_eq!(t.data[[2, 0, 0]], 0.0);
        assert_eq!(t.data[[2, 1, 3]], 1.0);
        assert_eq!(t.data[[0, 1, 3]], 0.0);
    }

    #[test]
    fn test_load_frame_resizes() {
        let dir = TempDir::new().unwrap();
        let path = write_png(dir.path(), "frame_0001.png", 32, 20, |_, _| [128, 128, 128]);

        let t = load_frame(&path, ImageConfig { width: 8, height: 8 }).unwrap();
        assert_eq!((t.height(), t.width()), (8, 8));
        assert!(t.data.iter().all(|v| (*v - 128.0 / 255.0).abs() < 0.01));
    }

    #[test]
    fn test_stack_sequence_blanks_unreadable_frames() {
        let dir = TempDir::new().unwrap();
        let a = write_png(dir.path(), "frame_0001.png", 4, 4, |_, _| [255, 255, 255]);
        let bad = dir.path().join("frame_0002.jpg");
        std::fs::write(&bad, b"not an image").unwrap();

        let seq = load_sequence(&[a.clone(), bad, a], ImageConfig { width: 4, height: 4 }, &Augmentation::default()).unwrap();
        assert_eq!(seq.tensor.channels(), 9);
        assert_eq!(seq.decoded, vec![true, false, true]);
        assert_eq!(seq.blank_count(), 1);
        assert!(seq.tensor.channel(0).iter().all(|v| *v == 1.0));
        assert!(seq.tensor.channel(4).iter().all(|v| *v == 0.0));
        assert!(seq.tensor.channel(8).iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_stack_rejects_mismatched_sizes() {
        let parts = vec![ImageTensor::zeros(3, 2, 2), ImageTensor::zeros(3, 2, 3)];
        assert!(stack(&parts).is_err());
        assert!(stack(&[]).is_err());
    }

    #[test]
    fn test_hsv_matches_8bit_scale() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([40, 40, 40]), [0, 0, 40]);
        for rgb in [[200, 90, 40], [10, 120, 200], [255, 255, 255], [0, 0, 0]] {
            let back = hsv_to_rgb(rgb_to_hsv(rgb));
            for c in 0..3 {
                assert!((i16::from(back[c]) - i16::from(rgb[c])).abs() <= 3, "{:?} -> {:?}", rgb, back);
            }
        }
    }

    #[test]
    fn test_court_colour_swap_repaints_clay_only() {
        // clay court with a grey line down column 0
        let clay = [200, 90, 40];
        let img = RgbImage::from_fn(8, 8, |x, _| Rgb(if x == 0 { [128, 128, 128] } else { clay }));

        let out = court_colour_swap(&img, 70);
        assert_eq!(out.get_pixel(0, 4).0, [128, 128, 128]);
        let [h, s, v] = rgb_to_hsv(out.get_pixel(5, 4).0);
        assert!((i16::from(h) - 70).abs() <= 1, "hue {}", h);
        let [_, s0, v0] = rgb_to_hsv(clay);
        assert!((i16::from(s) - i16::from(s0)).abs() <= 2);
        assert!((i16::from(v) - i16::from(v0)).abs() <= 2);
    }

    #[test]
    fn test_court_colour_swap_ignores_isolated_pixels() {
        let mut img = RgbImage::from_pixel(7, 7, Rgb([20, 60, 200]));
        img.put_pixel(3, 3, Rgb([200, 90, 40]));
        assert_eq!(court_colour_swap(&img, 110), img);
    }

    #[test]
    fn test_keystone_keeps_size_and_identity_shift() {
        let img = RgbImage::from_fn(20, 12, |x, y| Rgb([(x * 10) as u8, (y * 20) as u8, 99]));

        let still = keystone(&img, &[(0.0, 0.0); 4]);
        assert_eq!(still.dimensions(), (20, 12));
        let (a, b) = (still.get_pixel(10, 6).0, img.get_pixel(10, 6).0);
        for c in 0..3 {
            assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 2, "{:?} vs {:?}", a, b);
        }

        let tilted = keystone(&img, &[(1.0, -1.0), (-1.0, 1.0), (0.5, 0.5), (-0.5, 0.0)]);
        assert_eq!(tilted.dimensions(), (20, 12));
        assert_ne!(tilted, img);
    }

    #[test]
    fn test_reflect_padding_skips_edge() {
        assert_eq!(reflect_101(-1, 4), 1);
        assert_eq!(reflect_101(-2, 4), 2);
        assert_eq!(reflect_101(4, 4), 2);
        assert_eq!(reflect_101(2, 4), 2);
        assert_eq!(reflect_101(-3, 1), 0);
    }

    #[test]
    fn test_flip_augmentation_mirrors_frame() {
        let dir = TempDir::new().unwrap();
        let path = write_png(dir.path(), "frame_0001.png", 4, 1, |x, _| [(x * 60) as u8, 0, 0]);
        let size = ImageConfig { width: 4, height: 1 };

        let flip = Augmentation { flip: true, ..Augmentation::default() };
        let plain = load_frame(&path, size).unwrap();
        let mirrored = load_frame_augmented(&path, size, &flip).unwrap();
        let row: Vec<f32> = plain.channel(0).row(0).iter().rev().copied().collect();
        assert_eq!(mirrored.channel(0).row(0).to_vec(), row);
    }

    #[test]
    fn test_sampled_augmentations_cover_every_kind() {
        let mut rng = StdRng::seed_from_u64(3);
        let draws: Vec<Augmentation> = (0..200).map(|_| Augmentation::sample(&mut rng)).collect();

        assert!(draws.iter().any(|a| a.flip) && draws.iter().any(|a| !a.flip));
        assert!(draws.iter().any(|a| a.court_hue == Some(70)));
        assert!(draws.iter().any(|a| a.court_hue == Some(110)));
        assert!(draws.iter().any(|a| a.keystone.is_some()));
        assert!(draws.iter().any(|a| *a == Augmentation::default()));
        for shifts in draws.iter().filter_map(|a| a.keystone) {
            assert!(shifts.iter().all(|(x, y)| x.abs() <= 1.0 && y.abs() <= 1.0));
        }
    }
}
