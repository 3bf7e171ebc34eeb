/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> JobRecord (JSON)
/// - `parts`: part:{job_id}:{part_number:010} -> PartRecord (JSON)
/// - `metadata`: meta:{key} -> value (string)
///
/// Part numbers are zero-padded so a prefix scan yields ascending part order.

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Decode a job key: job:{job_id} -> job_id
pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

/// Encode a part key: part:{job_id}:{part_number:010}
pub fn encode_part_key(job_id: &str, part_number: u32) -> Vec<u8> {
    format!("part:{}:{:010}", job_id, part_number).into_bytes()
}

/// Encode a part prefix for range scan: part:{job_id}:
pub fn encode_part_prefix(job_id: &str) -> Vec<u8> {
    format!("part:{}:", job_id).into_bytes()
}

/// Decode a part key: part:{job_id}:{part_number:010} -> (job_id, part_number)
///
/// Job ids may themselves contain ':', so the part number is split from the right.
pub fn decode_part_key(key: &[u8]) -> Option<(String, u32)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (job_id, part) = key_str.strip_prefix("part:")?.rsplit_once(':')?;
    Some((job_id.to_string(), part.parse().ok()?))
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
