//! Minimal single-HDU FITS codec for 2-D detector images.
//!
//! Headers are 80-character cards padded to 2880-byte blocks, followed by
//! big-endian pixel data. `NAXIS1` is the fast (column) axis.

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{ReduxError, Result};

pub const FITS_BLOCK_SIZE: usize = 2880;
pub const FITS_CARD_SIZE: usize = 80;

/// Keywords describing the data layout; regenerated on every write.
const STRUCTURAL_KEYS: [&str; 8] = [
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "BSCALE", "BZERO", "EXTEND",
];

#[derive(Clone, Debug, PartialEq)]
pub enum FitsValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Commentary card (COMMENT, HISTORY, blank keyword).
    Comment(String),
}

impl FitsValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for FitsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logical(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Comment(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered list of header cards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<(String, FitsValue)>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a keyword. Commentary cards always append.
    pub fn set(&mut self, key: &str, value: FitsValue) {
        let key = key.trim().to_uppercase();
        if !matches!(value, FitsValue::Comment(_)) {
            if let Some(slot) = self.cards.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }
        }
        self.cards.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&FitsValue> {
        let key = key.to_uppercase();
        self.cards
            .iter()
            .find(|(k, v)| *k == key && !matches!(v, FitsValue::Comment(_)))
            .map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FitsValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FitsValue::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FitsValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FitsValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Read the primary image and header of a FITS file.
pub fn read_fits(path: &Path) -> Result<(Array2<f64>, FitsHeader)> {
    if !path.exists() {
        return Err(ReduxError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    decode_fits(&mmap)
}

/// Decode a FITS image held in memory.
pub fn decode_fits(bytes: &[u8]) -> Result<(Array2<f64>, FitsHeader)> {
    let (header, data_offset) = parse_header(bytes)?;

    if header.get("SIMPLE") != Some(&FitsValue::Logical(true)) {
        return Err(ReduxError::InvalidFits("missing SIMPLE = T".into()));
    }
    let bitpix = required_int(&header, "BITPIX")?;
    let naxis = required_int(&header, "NAXIS")?;
    if naxis != 2 {
        return Err(ReduxError::InvalidFits(format!(
            "expected a 2-D image, NAXIS = {naxis}"
        )));
    }
    let cols = axis_len(&header, "NAXIS1")?;
    let rows = axis_len(&header, "NAXIS2")?;
    let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
    let bzero = header.get_f64("BZERO").unwrap_or(0.0);

    let bytes_per_pixel = match bitpix {
        8 => 1,
        16 => 2,
        32 | -32 => 4,
        64 | -64 => 8,
        other => {
            return Err(ReduxError::InvalidFits(format!(
                "unsupported BITPIX {other}"
            )))
        }
    };
    let pixel_count = rows
        .checked_mul(cols)
        .ok_or_else(|| ReduxError::InvalidFits(format!("image {cols}x{rows} is too large")))?;
    let data_len = pixel_count
        .checked_mul(bytes_per_pixel)
        .ok_or_else(|| ReduxError::InvalidFits(format!("image {cols}x{rows} is too large")))?;
    let data_end = data_offset
        .checked_add(data_len)
        .ok_or_else(|| ReduxError::InvalidFits(format!("image {cols}x{rows} is too large")))?;
    if bytes.len() < data_end {
        return Err(ReduxError::InvalidFits(format!(
            "data truncated: expected {} bytes, got {}",
            data_len,
            bytes.len().saturating_sub(data_offset)
        )));
    }

    let mut cursor = Cursor::new(&bytes[data_offset..data_end]);
    let mut pixels = Vec::with_capacity(pixel_count);
    for _ in 0..pixel_count {
        let raw = match bitpix {
            8 => cursor.read_u8()? as f64,
            16 => cursor.read_i16::<BigEndian>()? as f64,
            32 => cursor.read_i32::<BigEndian>()? as f64,
            64 => cursor.read_i64::<BigEndian>()? as f64,
            -32 => cursor.read_f32::<BigEndian>()? as f64,
            _ => cursor.read_f64::<BigEndian>()?,
        };
        pixels.push(bzero + bscale * raw);
    }

    let data = Array2::from_shape_vec((rows, cols), pixels)
        .map_err(|e| ReduxError::InvalidFits(e.to_string()))?;
    Ok((data, header))
}

/// Write a 2-D image as a 64-bit float FITS file.
///
/// Non-structural keywords from `header` are carried over in order.
pub fn write_fits(path: &Path, data: &Array2<f64>, header: &FitsHeader) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    out.write_all(&encode_fits(data, header))?;
    out.flush()?;
    Ok(())
}

/// Encode a 2-D image as a 64-bit float FITS byte stream.
pub fn encode_fits(data: &Array2<f64>, header: &FitsHeader) -> Vec<u8> {
    let (rows, cols) = data.dim();
    let mut buf = Vec::with_capacity(FITS_BLOCK_SIZE * 2 + rows * cols * 8);

    push_card(&mut buf, &value_card("SIMPLE", &FitsValue::Logical(true)));
    push_card(&mut buf, &value_card("BITPIX", &FitsValue::Integer(-64)));
    push_card(&mut buf, &value_card("NAXIS", &FitsValue::Integer(2)));
    push_card(&mut buf, &value_card("NAXIS1", &FitsValue::Integer(cols as i64)));
    push_card(&mut buf, &value_card("NAXIS2", &FitsValue::Integer(rows as i64)));
    for (key, value) in header.iter() {
        if STRUCTURAL_KEYS.contains(&key) {
            continue;
        }
        push_card(&mut buf, &value_card(key, value));
    }
    push_card(&mut buf, "END");
    pad_block(&mut buf, b' ');

    for &v in data.iter() {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    pad_block(&mut buf, 0);
    buf
}

/// An axis length from the header; negative lengths are rejected.
fn axis_len(header: &FitsHeader, key: &str) -> Result<usize> {
    let n = required_int(header, key)?;
    usize::try_from(n).map_err(|_| ReduxError::InvalidFits(format!("{key} = {n} is negative")))
}

fn required_int(header: &FitsHeader, key: &str) -> Result<i64> {
    header
        .get_i64(key)
        .ok_or_else(|| ReduxError::InvalidFits(format!("missing {key}")))
}

/// Parse header cards up to END; returns the header and the data offset.
fn parse_header(bytes: &[u8]) -> Result<(FitsHeader, usize)> {
    let mut header = FitsHeader::new();
    let mut offset = 0;

    loop {
        if offset + FITS_CARD_SIZE > bytes.len() {
            return Err(ReduxError::InvalidFits("no END card".into()));
        }
        let card: String = bytes[offset..offset + FITS_CARD_SIZE]
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { ' ' })
            .collect();
        offset += FITS_CARD_SIZE;

        let key = card[..8].trim();
        if key == "END" {
            break;
        }
        if &card[8..10] == "= " {
            header.set(key, parse_value(&card[10..])?);
        } else if !key.is_empty() || !card.trim().is_empty() {
            header.set(key, FitsValue::Comment(card[8..].trim_end().to_string()));
        }
    }

    let data_offset = offset.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
    Ok((header, data_offset))
}

fn parse_value(field: &str) -> Result<FitsValue> {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    text.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                text.push(c);
            }
        }
        return Ok(FitsValue::Text(text.trim_end().to_string()));
    }

    let token = field.split('/').next().unwrap_or("").trim();
    match token {
        "T" => Ok(FitsValue::Logical(true)),
        "F" => Ok(FitsValue::Logical(false)),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                Ok(FitsValue::Integer(i))
            } else {
                token
                    .replace(['D', 'd'], "E")
                    .parse::<f64>()
                    .map(FitsValue::Float)
                    .map_err(|_| ReduxError::InvalidFits(format!("bad header value '{token}'")))
            }
        }
    }
}

fn value_card(key: &str, value: &FitsValue) -> String {
    match value {
        FitsValue::Logical(_) | FitsValue::Integer(_) => {
            format!("{:<8}= {:>20}", key, value.to_string())
        }
        FitsValue::Float(v) => format!("{:<8}= {:>20}", key, format!("{v:.16E}")),
        FitsValue::Text(s) => {
            let escaped = s.replace('\'', "''");
            format!("{:<8}= '{:<8}'", key, escaped)
        }
        FitsValue::Comment(s) => format!("{key:<8}{s}"),
    }
}

fn push_card(buf: &mut Vec<u8>, card: &str) {
    let mut bytes: Vec<u8> = card.bytes().take(FITS_CARD_SIZE).collect();
    bytes.resize(FITS_CARD_SIZE, b' ');
    buf.extend_from_slice(&bytes);
}

fn pad_block(buf: &mut Vec<u8>, fill: u8) {
    let padded = buf.len().div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
    buf.resize(padded, fill);
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn header_block(cols: i64, rows: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        push_card(&mut buf, &value_card("SIMPLE", &FitsValue::Logical(true)));
        push_card(&mut buf, &value_card("BITPIX", &FitsValue::Integer(-64)));
        push_card(&mut buf, &value_card("NAXIS", &FitsValue::Integer(2)));
        push_card(&mut buf, &value_card("NAXIS1", &FitsValue::Integer(cols)));
        push_card(&mut buf, &value_card("NAXIS2", &FitsValue::Integer(rows)));
        push_card(&mut buf, "END");
        pad_block(&mut buf, b' ');
        buf
    }

    #[test]
    fn test_parse_value_kinds() {
        assert_eq!(parse_value("                   T").unwrap(), FitsValue::Logical(true));
        assert_eq!(parse_value("  60 / seconds").unwrap(), FitsValue::Integer(60));
        assert_eq!(parse_value(" 1.5D2").unwrap(), FitsValue::Float(150.0));
        assert_eq!(
            parse_value(" 'it''s   ' / quoted").unwrap(),
            FitsValue::Text("it's".into())
        );
    }

    #[test]
    fn test_header_set_replaces() {
        let mut h = FitsHeader::new();
        h.set("exptime", FitsValue::Float(30.0));
        h.set("EXPTIME", FitsValue::Float(60.0));
        assert_eq!(h.len(), 1);
        assert_eq!(h.get_f64("EXPTIME"), Some(60.0));
    }

    #[test]
    fn test_encoded_length_is_block_aligned() {
        let data = Array2::<f64>::zeros((3, 5));
        let bytes = encode_fits(&data, &FitsHeader::new());
        assert_eq!(bytes.len() % FITS_BLOCK_SIZE, 0);
    }

    #[test]
    fn test_decode_int16_with_bzero() {
        let mut buf = Vec::new();
        push_card(&mut buf, &value_card("SIMPLE", &FitsValue::Logical(true)));
        push_card(&mut buf, &value_card("BITPIX", &FitsValue::Integer(16)));
        push_card(&mut buf, &value_card("NAXIS", &FitsValue::Integer(2)));
        push_card(&mut buf, &value_card("NAXIS1", &FitsValue::Integer(2)));
        push_card(&mut buf, &value_card("NAXIS2", &FitsValue::Integer(1)));
        push_card(&mut buf, &value_card("BZERO", &FitsValue::Integer(32768)));
        push_card(&mut buf, "END");
        pad_block(&mut buf, b' ');
        buf.write_i16::<BigEndian>(-32768).unwrap();
        buf.write_i16::<BigEndian>(100).unwrap();
        pad_block(&mut buf, 0);

        let (data, _) = decode_fits(&buf).unwrap();
        assert_eq!(data.dim(), (1, 2));
        assert_eq!(data[[0, 0]], 0.0);
        assert_eq!(data[[0, 1]], 32868.0);
    }

    #[test]
    fn test_negative_axis_is_rejected() {
        let buf = header_block(-1, 4);
        assert!(matches!(decode_fits(&buf), Err(ReduxError::InvalidFits(_))));
        let buf = header_block(4, -3);
        assert!(matches!(decode_fits(&buf), Err(ReduxError::InvalidFits(_))));
    }

    #[test]
    fn test_oversized_axes_are_rejected() {
        let huge = 1_i64 << 40;
        let buf = header_block(huge, huge);
        assert!(matches!(decode_fits(&buf), Err(ReduxError::InvalidFits(_))));
    }

    #[test]
    fn test_axes_larger_than_payload_are_truncated_data() {
        let mut buf = header_block(100, 100);
        buf.extend_from_slice(&[0u8; 16]);
        let err = decode_fits(&buf).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_encoded_pixels_are_big_endian_f64() {
        let data = Array2::from_shape_vec((1, 2), vec![1.5, -2.0]).unwrap();
        let bytes = encode_fits(&data, &FitsHeader::new());
        let start = FITS_BLOCK_SIZE;
        assert_eq!(&bytes[start..start + 8], &1.5f64.to_be_bytes());
        assert_eq!(&bytes[start + 8..start + 16], &(-2.0f64).to_be_bytes());
        let (back, _) = decode_fits(&bytes).unwrap();
        assert_eq!(back, data);
    }
}
