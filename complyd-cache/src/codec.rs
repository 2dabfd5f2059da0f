use std::io::{Read, Write};

use complyd_core::{DataAccessError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{CategoryConfig, SerializationFormat};

/// Encodes a value per the category's serialization format, then
/// compresses when the category enables it.
pub fn encode<T: Serialize>(value: &T, config: &CategoryConfig) -> Result<Vec<u8>> {
    let encoded = match config.format {
        SerializationFormat::Json => serde_json::to_vec(value)?,
        SerializationFormat::Binary => bincode::serialize(value)
            .map_err(|err| DataAccessError::Serialization(err.to_string()))?,
    };

    if config.compression_enabled {
        gzip_compress(&encoded)
    } else {
        Ok(encoded)
    }
}

/// Inverse of [`encode`]: decompress when the category compresses, then
/// decode per the category's format.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], config: &CategoryConfig) -> Result<T> {
    let raw = if config.compression_enabled {
        gzip_decompress(bytes)?
    } else {
        bytes.to_vec()
    };

    match config.format {
        SerializationFormat::Json => Ok(serde_json::from_slice(&raw)?),
        SerializationFormat::Binary => bincode::deserialize(&raw)
            .map_err(|err| DataAccessError::Serialization(err.to_string())),
    }
}

fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|err| DataAccessError::Serialization(format!("gzip encode: {}", err)))?;
    encoder
        .finish()
        .map_err(|err| DataAccessError::Serialization(format!("gzip encode: {}", err)))
}

fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| DataAccessError::Serialization(format!("gzip decode: {}", err)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionIntent;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ScreeningHit {
        entity: String,
        score: u32,
        flagged: bool,
    }

    fn config(format: SerializationFormat, compressed: bool) -> CategoryConfig {
        CategoryConfig {
            ttl_seconds: 300,
            max_size_mb: 10,
            compression_enabled: compressed,
            format,
            eviction_intent: EvictionIntent::Lru,
            namespace: "complyd".to_string(),
        }
    }

    fn sample() -> ScreeningHit {
        ScreeningHit {
            entity: "Acme Holdings Ltd".to_string(),
            score: 87,
            flagged: true,
        }
    }

    #[test]
    fn json_round_trip() {
        let config = config(SerializationFormat::Json, false);
        let bytes = encode(&sample(), &config).unwrap();
        let decoded: ScreeningHit = decode(&bytes, &config).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn json_compressed_round_trip() {
        let config = config(SerializationFormat::Json, true);
        let bytes = encode(&sample(), &config).unwrap();
        let decoded: ScreeningHit = decode(&bytes, &config).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn binary_round_trip() {
        let config = config(SerializationFormat::Binary, false);
        let bytes = encode(&sample(), &config).unwrap();
        let decoded: ScreeningHit = decode(&bytes, &config).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn binary_compressed_round_trip() {
        let config = config(SerializationFormat::Binary, true);
        let bytes = encode(&sample(), &config).unwrap();
        let decoded: ScreeningHit = decode(&bytes, &config).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn compression_shrinks_repetitive_payloads() {
        let config_plain = config(SerializationFormat::Json, false);
        let config_gz = config(SerializationFormat::Json, true);
        let payload: Vec<String> = vec!["screening-pending".to_string(); 500];
        let plain = encode(&payload, &config_plain).unwrap();
        let compressed = encode(&payload, &config_gz).unwrap();
        assert!(compressed.len() < plain.len());
    }

    #[test]
    fn corrupt_compressed_payload_fails_decode() {
        let config = config(SerializationFormat::Json, true);
        let err = decode::<ScreeningHit>(b"not gzip at all", &config).unwrap_err();
        assert!(matches!(err, DataAccessError::Serialization(_)));
    }

    #[test]
    fn format_mismatch_fails_decode() {
        let json_config = config(SerializationFormat::Json, false);
        let binary_config = config(SerializationFormat::Binary, false);
        let bytes = encode(&sample(), &json_config).unwrap();
        assert!(decode::<ScreeningHit>(&bytes, &binary_config).is_err());
    }
}
