//! Project container: a framed, nested record structure over 32-bit
//! words, run-length compressed on disk.
//!
//! Document layout, every record beginning with `(size, type)` where
//! `size` counts words including the header:
//!
//! - type 0, root: `size` equals the total word count; body is a
//!   sequence of type-1 records.
//! - type 1, animation group: body is a sequence of type-2 records.
//! - type 2, animation: third word packs `height << 16 | width`; rest is
//!   a sequence of type-3 records. Child sizes must reconcile with the
//!   declared size.
//! - type 3, sprite: `(size, 3, packedDims, pixel...)` with
//!   `size == 3 + width*height` packed RGBA words.
//!
//! Any size or type mismatch is fatal to the load and names the
//! offending record. The pixel words use the same packing as
//! [`Color::word`], so sprites serialize with no per-channel work.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::canvas::PixelCanvas;
use crate::color::Color;
use crate::error::EngineError;

const RECORD_ROOT: u32 = 0;
const RECORD_GROUP: u32 = 1;
const RECORD_ANIMATION: u32 = 2;
const RECORD_SPRITE: u32 = 3;

/// A run is only worth encoding once it beats the `(flag, value, count)`
/// triplet it becomes.
const MIN_RUN: usize = 3;

// ============================================================================
// DOCUMENT MODEL
// ============================================================================

#[derive(Default, Debug)]
pub struct Project {
    pub groups: Vec<AnimationGroup>,
}

#[derive(Default, Debug)]
pub struct AnimationGroup {
    pub animations: Vec<Animation>,
}

#[derive(Debug)]
pub struct Animation {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<SpriteFrame>,
}

#[derive(Debug)]
pub struct SpriteFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl SpriteFrame {
    pub fn from_canvas(canvas: &PixelCanvas) -> Self {
        Self {
            width: canvas.width(),
            height: canvas.height(),
            pixels: canvas.pixels().to_vec(),
        }
    }

    pub fn to_canvas(&self) -> PixelCanvas {
        let mut canvas = PixelCanvas::new(self.width, self.height);
        for (i, &c) in self.pixels.iter().enumerate() {
            canvas.set_index(i, c);
        }
        canvas
    }

    fn word_size(&self) -> usize {
        3 + self.pixels.len()
    }
}

impl Animation {
    fn word_size(&self) -> usize {
        3 + self.frames.iter().map(SpriteFrame::word_size).sum::<usize>()
    }
}

impl AnimationGroup {
    fn word_size(&self) -> usize {
        2 + self.animations.iter().map(Animation::word_size).sum::<usize>()
    }
}

// ============================================================================
// ENCODE
// ============================================================================

/// Serialize the document to its framed word buffer (uncompressed).
pub fn encode_document(project: &Project) -> Vec<u32> {
    let total = 2 + project.groups.iter().map(AnimationGroup::word_size).sum::<usize>();
    let mut words = Vec::with_capacity(total);
    words.push(total as u32);
    words.push(RECORD_ROOT);

    for group in &project.groups {
        words.push(group.word_size() as u32);
        words.push(RECORD_GROUP);
        for anim in &group.animations {
            words.push(anim.word_size() as u32);
            words.push(RECORD_ANIMATION);
            words.push(pack_dims(anim.width, anim.height));
            for frame in &anim.frames {
                words.push(frame.word_size() as u32);
                words.push(RECORD_SPRITE);
                words.push(pack_dims(frame.width, frame.height));
                words.extend(frame.pixels.iter().map(|c| c.word()));
            }
        }
    }
    debug_assert_eq!(words.len(), total);
    words
}

#[inline]
fn pack_dims(width: u32, height: u32) -> u32 {
    debug_assert!(width <= 0xffff && height <= 0xffff);
    height << 16 | (width & 0xffff)
}

// ============================================================================
// DECODE
// ============================================================================

struct Reader<'a> {
    words: &'a [u32],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, reading: &'static str) -> Result<u32, EngineError> {
        let w = self
            .words
            .get(self.pos)
            .copied()
            .ok_or(EngineError::Truncated { at: self.pos, reading })?;
        self.pos += 1;
        Ok(w)
    }

    /// Read a `(size, type)` header, validating the expected type id and
    /// that the record fits in the buffer. Returns the record end offset.
    fn header(&mut self, expected_type: u32, name: &'static str) -> Result<usize, EngineError> {
        let at = self.pos;
        let size = self.take(name)? as usize;
        let kind = self.take(name)?;
        if kind != expected_type {
            return Err(EngineError::UnexpectedRecord {
                found: kind,
                at: at + 1,
                expected: name,
            });
        }
        let end = at + size;
        if size < 2 || end > self.words.len() {
            return Err(EngineError::SizeMismatch {
                record: name,
                at,
                declared: size,
                actual: self.words.len() - at,
            });
        }
        Ok(end)
    }
}

/// Parse a framed (already decompressed) word buffer.
pub fn decode_document(words: &[u32]) -> Result<Project, EngineError> {
    let mut r = Reader { words, pos: 0 };
    let root_end = r.header(RECORD_ROOT, "root")?;
    if root_end != words.len() {
        return Err(EngineError::SizeMismatch {
            record: "root",
            at: 0,
            declared: root_end,
            actual: words.len(),
        });
    }

    let mut project = Project::default();
    while r.pos < root_end {
        project.groups.push(decode_group(&mut r)?);
    }
    Ok(project)
}

fn decode_group(r: &mut Reader) -> Result<AnimationGroup, EngineError> {
    let at = r.pos;
    let end = r.header(RECORD_GROUP, "animation group")?;
    let mut group = AnimationGroup::default();
    while r.pos < end {
        group.animations.push(decode_animation(r, end)?);
    }
    if r.pos != end {
        return Err(EngineError::SizeMismatch {
            record: "animation group",
            at,
            declared: end - at,
            actual: r.pos - at,
        });
    }
    Ok(group)
}

fn decode_animation(r: &mut Reader, parent_end: usize) -> Result<Animation, EngineError> {
    let at = r.pos;
    let end = r.header(RECORD_ANIMATION, "animation")?;
    if end > parent_end {
        return Err(EngineError::SizeMismatch {
            record: "animation",
            at,
            declared: end - at,
            actual: parent_end - at,
        });
    }
    let dims = r.take("animation dimensions")?;
    let (width, height) = (dims & 0xffff, dims >> 16);

    let mut anim = Animation {
        width,
        height,
        frames: Vec::new(),
    };
    while r.pos < end {
        anim.frames.push(decode_sprite(r, end)?);
    }
    // Child sizes must reconcile exactly with the declared size.
    if r.pos != end {
        return Err(EngineError::SizeMismatch {
            record: "animation",
            at,
            declared: end - at,
            actual: r.pos - at,
        });
    }
    Ok(anim)
}

fn decode_sprite(r: &mut Reader, parent_end: usize) -> Result<SpriteFrame, EngineError> {
    let at = r.pos;
    let end = r.header(RECORD_SPRITE, "sprite")?;
    if end > parent_end {
        return Err(EngineError::SizeMismatch {
            record: "sprite",
            at,
            declared: end - at,
            actual: parent_end - at,
        });
    }
    let dims = r.take("sprite dimensions")?;
    let (width, height) = (dims & 0xffff, dims >> 16);
    let pixel_count = (width as usize) * (height as usize);
    if end - at != 3 + pixel_count {
        return Err(EngineError::SizeMismatch {
            record: "sprite",
            at,
            declared: end - at,
            actual: 3 + pixel_count,
        });
    }

    let mut pixels = Vec::with_capacity(pixel_count);
    for _ in 0..pixel_count {
        pixels.push(Color(r.take("sprite pixels")?));
    }
    Ok(SpriteFrame {
        width,
        height,
        pixels,
    })
}

// ============================================================================
// RUN-LENGTH COMPRESSION
// ============================================================================

/// Compress a word buffer. The output starts with the chosen flag word;
/// runs longer than two words become `(flag, value, count)` triplets, and
/// literal occurrences of the flag itself are always escaped as a run of
/// length 1.
pub fn rle_compress(words: &[u32]) -> Vec<u32> {
    let flag = choose_flag(words);
    let mut out = Vec::with_capacity(words.len() / 2 + 1);
    out.push(flag);

    let mut i = 0usize;
    while i < words.len() {
        let value = words[i];
        let mut run = 1usize;
        while i + run < words.len() && words[i + run] == value {
            run += 1;
        }
        if value == flag {
            for _ in 0..run {
                out.extend_from_slice(&[flag, flag, 1]);
            }
        } else if run >= MIN_RUN {
            out.extend_from_slice(&[flag, value, run as u32]);
        } else {
            for _ in 0..run {
                out.push(value);
            }
        }
        i += run;
    }
    out
}

/// Re-expand an RLE stream produced by [`rle_compress`].
pub fn rle_decompress(words: &[u32]) -> Result<Vec<u32>, EngineError> {
    let Some((&flag, body)) = words.split_first() else {
        return Err(EngineError::Truncated {
            at: 0,
            reading: "compression flag",
        });
    };
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0usize;
    while i < body.len() {
        let w = body[i];
        if w == flag {
            if i + 2 >= body.len() {
                return Err(EngineError::Truncated {
                    at: i + 1,
                    reading: "run triplet",
                });
            }
            let value = body[i + 1];
            let count = body[i + 2] as usize;
            out.extend(std::iter::repeat_n(value, count));
            i += 3;
        } else {
            out.push(w);
            i += 1;
        }
    }
    Ok(out)
}

/// Pick the run flag: the least-frequent word in the buffer. Every
/// literal flag occurrence costs two extra words, so when even the rarest
/// value is still common a random word absent from the buffer is searched
/// for instead.
fn choose_flag(words: &[u32]) -> u32 {
    if words.is_empty() {
        return 0;
    }
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &w in words {
        *counts.entry(w).or_insert(0) += 1;
    }
    let (&rarest, &count) = counts
        .iter()
        .min_by_key(|&(_, c)| c)
        .expect("non-empty buffer");

    if count <= (words.len() / 64).max(1) {
        return rarest;
    }
    let present: HashSet<u32> = counts.into_keys().collect();
    let mut rng = SmallRng::from_os_rng();
    loop {
        let candidate: u32 = rng.random();
        if !present.contains(&candidate) {
            return candidate;
        }
    }
}

// ============================================================================
// FILE I/O
// ============================================================================

/// Encode, compress and write a project to disk (little-endian words).
pub fn write_file(path: &Path, project: &Project) -> Result<(), EngineError> {
    let words = rle_compress(&encode_document(project));
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read, decompress and parse a project file.
pub fn read_file(path: &Path) -> Result<Project, EngineError> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(EngineError::Truncated {
            at: bytes.len() / 4,
            reading: "word stream",
        });
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    decode_document(&rle_decompress(&words)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> Project {
        let frame_a = SpriteFrame {
            width: 4,
            height: 3,
            pixels: (0..12)
                .map(|i| {
                    if i < 8 {
                        Color::opaque(200, 10, 10)
                    } else {
                        Color(0)
                    }
                })
                .collect(),
        };
        let frame_b = SpriteFrame {
            width: 4,
            height: 3,
            pixels: vec![Color::opaque(1, 2, 3); 12],
        };
        Project {
            groups: vec![AnimationGroup {
                animations: vec![Animation {
                    width: 4,
                    height: 3,
                    frames: vec![frame_a, frame_b],
                }],
            }],
        }
    }

    #[test]
    fn document_round_trip() {
        let project = sample_project();
        let words = encode_document(&project);
        let back = decode_document(&words).unwrap();

        assert_eq!(back.groups.len(), 1);
        let anim = &back.groups[0].animations[0];
        assert_eq!((anim.width, anim.height), (4, 3));
        assert_eq!(anim.frames.len(), 2);
        assert_eq!(anim.frames[0].pixels, project.groups[0].animations[0].frames[0].pixels);
        assert_eq!(anim.frames[1].pixels[11], Color::opaque(1, 2, 3));
    }

    #[test]
    fn root_size_is_total_length() {
        let words = encode_document(&sample_project());
        assert_eq!(words[0] as usize, words.len());
        assert_eq!(words[1], RECORD_ROOT);
    }

    #[test]
    fn sprite_packs_dims_as_height_then_width() {
        let words = encode_document(&sample_project());
        // root(2) + group header(2) + animation header(2):
        assert_eq!(words[6], 3 << 16 | 4);
        // sprite record: size, type, dims.
        assert_eq!(words[7] as usize, 3 + 12);
        assert_eq!(words[8], RECORD_SPRITE);
        assert_eq!(words[9], 3 << 16 | 4);
    }

    #[test]
    fn wrong_root_type_is_fatal() {
        let mut words = encode_document(&sample_project());
        words[1] = 9;
        assert!(matches!(
            decode_document(&words),
            Err(EngineError::UnexpectedRecord { found: 9, .. })
        ));
    }

    #[test]
    fn root_size_mismatch_is_fatal() {
        let mut words = encode_document(&sample_project());
        words[0] += 1;
        assert!(matches!(
            decode_document(&words),
            Err(EngineError::SizeMismatch { record: "root", .. })
        ));
    }

    #[test]
    fn sprite_size_mismatch_names_the_sprite() {
        let mut words = encode_document(&sample_project());
        // Corrupt the first sprite's declared size; the animation's child
        // reconciliation or the sprite check must trip, not a panic.
        words[7] -= 1;
        let err = decode_document(&words).unwrap_err();
        assert!(matches!(err, EngineError::SizeMismatch { .. }), "{err}");
    }

    #[test]
    fn truncated_buffer_is_fatal() {
        let words = encode_document(&sample_project());
        let cut = &words[..words.len() - 4];
        assert!(decode_document(cut).is_err());
    }

    #[test]
    fn rle_round_trips_runs_and_literals() {
        let data = vec![7, 7, 7, 7, 7, 1, 2, 3, 9, 9, 9, 9, 4];
        let packed = rle_compress(&data);
        assert!(packed.len() < data.len() + 1);
        assert_eq!(rle_decompress(&packed).unwrap(), data);
    }

    #[test]
    fn rle_escapes_literal_flag_occurrences() {
        // 64 identical words force the fallback flag search; whatever
        // flag is chosen, the literal data must survive.
        let data = vec![0xdead_beefu32; 64];
        let packed = rle_compress(&data);
        assert_eq!(rle_decompress(&packed).unwrap(), data);

        // A buffer containing many distinct values keeps a natural flag,
        // which must be escaped when it appears literally.
        let data: Vec<u32> = (0..40).chain(std::iter::once(5)).collect();
        let packed = rle_compress(&data);
        assert_eq!(rle_decompress(&packed).unwrap(), data);
    }

    #[test]
    fn rle_truncated_triplet_is_fatal() {
        let data = vec![8u32; 10];
        let mut packed = rle_compress(&data);
        packed.pop();
        assert!(matches!(
            rle_decompress(&packed),
            Err(EngineError::Truncated { reading: "run triplet", .. })
        ));
    }

    #[test]
    fn rle_empty_stream_is_fatal() {
        assert!(rle_decompress(&[]).is_err());
        assert_eq!(rle_decompress(&[123]).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn file_round_trip_through_compression() {
        let dir = std::env::temp_dir().join("pixelfe-project-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.pxe");

        let project = sample_project();
        write_file(&path, &project).unwrap();
        let back = read_file(&path).unwrap();
        assert_eq!(
            back.groups[0].animations[0].frames[0].pixels,
            project.groups[0].animations[0].frames[0].pixels
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn canvas_conversion_round_trips() {
        let mut canvas = PixelCanvas::new(3, 2);
        canvas.set_pixel(2, 1, Color::opaque(9, 8, 7));
        let frame = SpriteFrame::from_canvas(&canvas);
        let back = frame.to_canvas();
        assert_eq!(back.pixels(), canvas.pixels());
    }
}
