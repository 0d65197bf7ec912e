//! B3DM (Batched 3D Model) framing.
//!
//! A 28-byte header, space-padded feature-table and batch-table JSON, then
//! the GLB payload. The feature table is padded so the GLB starts 8-aligned;
//! the batch table is padded to a multiple of 8 on its own.

use bytemuck::{Pod, Zeroable};

use crate::error::{Result, TilerError};

/// B3DM file header (28 bytes, little-endian).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct B3dmHeader {
    /// Magic bytes "b3dm".
    pub magic: [u8; 4],
    /// Version, always 1.
    pub version: u32,
    /// Total byte length of the file.
    pub byte_length: u32,
    pub feature_table_json_byte_length: u32,
    pub feature_table_binary_byte_length: u32,
    pub batch_table_json_byte_length: u32,
    pub batch_table_binary_byte_length: u32,
}

pub const B3DM_HEADER_SIZE: usize = 28;

/// Wrap a GLB payload into a B3DM frame with `mesh_count` batch entries.
pub fn encode_b3dm(glb: &[u8], mesh_count: usize) -> Vec<u8> {
    let mut feature_json = format!("{{\"BATCH_LENGTH\":{mesh_count}}}");
    while (feature_json.len() + B3DM_HEADER_SIZE) % 8 != 0 {
        feature_json.push(' ');
    }

    let ids: Vec<usize> = (0..mesh_count).collect();
    let names: Vec<String> = (0..mesh_count).map(|i| format!("mesh_{i}")).collect();
    let mut batch_json = serde_json::json!({ "batchId": ids, "name": names }).to_string();
    while batch_json.len() % 8 != 0 {
        batch_json.push(' ');
    }

    let total = B3DM_HEADER_SIZE + feature_json.len() + batch_json.len() + glb.len();
    let header = B3dmHeader {
        magic: *b"b3dm",
        version: 1,
        byte_length: total as u32,
        feature_table_json_byte_length: feature_json.len() as u32,
        feature_table_binary_byte_length: 0,
        batch_table_json_byte_length: batch_json.len() as u32,
        batch_table_binary_byte_length: 0,
    };

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(feature_json.as_bytes());
    out.extend_from_slice(batch_json.as_bytes());
    out.extend_from_slice(glb);
    out
}

/// Decoded B3DM frame.
#[derive(Debug)]
pub struct B3dmFrame {
    pub header: B3dmHeader,
    pub feature_table: serde_json::Value,
    pub batch_table: Option<serde_json::Value>,
    pub glb: Vec<u8>,
}

/// Parse a B3DM frame, validating the header lengths.
pub fn decode_b3dm(data: &[u8]) -> Result<B3dmFrame> {
    if data.len() < B3DM_HEADER_SIZE {
        return Err(TilerError::parse("b3dm: file too small for header"));
    }
    let header: B3dmHeader = bytemuck::pod_read_unaligned(&data[0..B3DM_HEADER_SIZE]);
    if &header.magic != b"b3dm" {
        return Err(TilerError::parse(format!(
            "b3dm: bad magic {:?}",
            header.magic
        )));
    }
    if header.version != 1 {
        return Err(TilerError::parse(format!(
            "b3dm: unsupported version {}",
            header.version
        )));
    }
    if header.byte_length as usize != data.len() {
        return Err(TilerError::parse(format!(
            "b3dm: header claims {} bytes, file has {}",
            header.byte_length,
            data.len()
        )));
    }

    let mut offset = B3DM_HEADER_SIZE;
    let ft_end = offset + header.feature_table_json_byte_length as usize;
    if ft_end > data.len() {
        return Err(TilerError::parse("b3dm: feature table out of bounds"));
    }
    let feature_table = if header.feature_table_json_byte_length > 0 {
        let text = std::str::from_utf8(&data[offset..ft_end])
            .map_err(|e| TilerError::parse(format!("b3dm: feature table utf8: {e}")))?;
        serde_json::from_str(text)?
    } else {
        serde_json::Value::Object(serde_json::Map::new())
    };
    offset = ft_end + header.feature_table_binary_byte_length as usize;

    let bt_end = offset + header.batch_table_json_byte_length as usize;
    if bt_end > data.len() {
        return Err(TilerError::parse("b3dm: batch table out of bounds"));
    }
    let batch_table = if header.batch_table_json_byte_length > 0 {
        let text = std::str::from_utf8(&data[offset..bt_end])
            .map_err(|e| TilerError::parse(format!("b3dm: batch table utf8: {e}")))?;
        Some(serde_json::from_str(text)?)
    } else {
        None
    };
    offset = bt_end + header.batch_table_binary_byte_length as usize;

    Ok(B3dmFrame {
        header,
        feature_table,
        batch_table,
        glb: data[offset..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_28_bytes() {
        assert_eq!(std::mem::size_of::<B3dmHeader>(), B3DM_HEADER_SIZE);
    }

    #[test]
    fn test_encode_padding_rules() {
        let glb = vec![0u8; 100];
        let b3dm = encode_b3dm(&glb, 1);

        let header: B3dmHeader = bytemuck::pod_read_unaligned(&b3dm[0..B3DM_HEADER_SIZE]);
        assert_eq!(&header.magic, b"b3dm");
        assert_eq!(header.version, 1);
        assert_eq!(header.byte_length as usize, b3dm.len());
        assert_eq!(
            (B3DM_HEADER_SIZE + header.feature_table_json_byte_length as usize) % 8,
            0
        );
        assert_eq!(header.batch_table_json_byte_length % 8, 0);
        assert_eq!(header.feature_table_binary_byte_length, 0);
        assert_eq!(header.batch_table_binary_byte_length, 0);
    }

    #[test]
    fn test_roundtrip() {
        let glb = b"glTFfakepayload".to_vec();
        let b3dm = encode_b3dm(&glb, 1);
        let frame = decode_b3dm(&b3dm).unwrap();

        assert_eq!(frame.feature_table["BATCH_LENGTH"], 1);
        let batch = frame.batch_table.unwrap();
        assert_eq!(batch["batchId"][0], 0);
        assert_eq!(batch["name"][0], "mesh_0");
        assert_eq!(frame.glb, glb);
    }

    #[test]
    fn test_total_length_accounts_for_every_section() {
        let glb = vec![7u8; 57];
        let b3dm = encode_b3dm(&glb, 1);
        let header: B3dmHeader = bytemuck::pod_read_unaligned(&b3dm[0..B3DM_HEADER_SIZE]);
        let expected = B3DM_HEADER_SIZE
            + header.feature_table_json_byte_length as usize
            + header.feature_table_binary_byte_length as usize
            + header.batch_table_json_byte_length as usize
            + header.batch_table_binary_byte_length as usize
            + glb.len();
        assert_eq!(header.byte_length as usize, expected);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut b3dm = encode_b3dm(b"x", 1);
        b3dm[0] = b'X';
        assert!(decode_b3dm(&b3dm).is_err());
    }

    #[test]
    fn test_multi_mesh_batch_table() {
        let b3dm = encode_b3dm(b"glb", 3);
        let frame = decode_b3dm(&b3dm).unwrap();
        assert_eq!(frame.feature_table["BATCH_LENGTH"], 3);
        let batch = frame.batch_table.unwrap();
        assert_eq!(batch["batchId"], serde_json::json!([0, 1, 2]));
        assert_eq!(batch["name"][2], "mesh_2");
    }
}
