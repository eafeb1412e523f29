use serde::Deserialize;
use thiserror::Error;

use crate::cache::Cache;

/// Cache geometry: `s` set-index bits, `E` ways per set, `b` block-offset
/// bits. Unsigned fields make negative geometry unrepresentable; `validate`
/// handles the rest.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Config {
    pub set_bits: u32,
    pub ways: usize,
    pub block_bits: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("set bits ({set_bits}) + block bits ({block_bits}) must not exceed 63")]
    AddressOverflow { set_bits: u32, block_bits: u32 },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The tag shift is set_bits + block_bits; a u64 address cannot be
        // shifted by 64 or more.
        if self.set_bits as u64 + self.block_bits as u64 > 63 {
            return Err(ConfigError::AddressOverflow {
                set_bits: self.set_bits,
                block_bits: self.block_bits,
            });
        }
        Ok(())
    }

    pub fn to_cache(self) -> Result<Cache, ConfigError> {
        self.validate()?;
        Ok(Cache::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_geometry_builds_a_cache() {
        let config = Config {
            set_bits: 4,
            ways: 2,
            block_bits: 4,
        };
        let cache = config.to_cache().unwrap();
        assert_eq!(cache.n_sets, 16);
        assert_eq!(cache.n_ways, 2);
        assert_eq!(cache.lines.len(), 32);
    }

    #[test]
    fn oversized_address_split_is_rejected() {
        let config = Config {
            set_bits: 32,
            ways: 1,
            block_bits: 32,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_way_geometry_is_accepted() {
        let config = Config {
            set_bits: 1,
            ways: 0,
            block_bits: 0,
        };
        let cache = config.to_cache().unwrap();
        assert_eq!(cache.lines.len(), 0);
    }

    #[test]
    fn deserializes_from_json() {
        let config: Config =
            serde_json::from_str(r#"{ "set_bits": 4, "ways": 1, "block_bits": 4 }"#).unwrap();
        assert_eq!(config.set_bits, 4);
        assert_eq!(config.ways, 1);
        assert_eq!(config.block_bits, 4);
    }
}
