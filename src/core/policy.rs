/*!
 * Upload strategy selection
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use super::chunker::part_count;
use crate::config::{UploadConfig, MAX_PARTS, MAX_PART_SIZE};
use crate::error::{UploadError, UploadResult};

/// How an object will be uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStrategy {
    /// One put-object request
    SingleShot,
    /// A multipart session
    Multipart {
        part_size: u64,
        /// Workers actually used; never more than the part count
        concurrency: usize,
        part_count: u64,
    },
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStrategy::SingleShot => write!(f, "single-shot"),
            UploadStrategy::Multipart { .. } => write!(f, "multipart"),
        }
    }
}

/// Pick single-shot or multipart for an object of `object_size` bytes.
///
/// Objects smaller than the threshold go single-shot. The part size grows
/// when the configured one would need more than 10,000 parts.
pub fn choose_strategy(object_size: u64, config: &UploadConfig) -> UploadResult<UploadStrategy> {
    config.validate()?;

    if object_size < config.multipart_threshold {
        return Ok(UploadStrategy::SingleShot);
    }

    let mut part_size = config.part_size;
    if part_count(object_size, part_size) > MAX_PARTS {
        part_size = object_size.div_ceil(MAX_PARTS);
        if part_size > MAX_PART_SIZE {
            return Err(UploadError::InvalidConfiguration(format!(
                "object of {} bytes exceeds {} parts of {} bytes",
                object_size, MAX_PARTS, MAX_PART_SIZE
            )));
        }
    }

    let parts = part_count(object_size, part_size);
    let concurrency = config
        .max_concurrency
        .min(usize::try_from(parts).unwrap_or(usize::MAX));

    Ok(UploadStrategy::Multipart {
        part_size,
        concurrency,
        part_count: parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_SINGLE_SHOT_SIZE;

    const MB: u64 = 1024 * 1024;

    fn config(part_size: u64, concurrency: usize, threshold: u64) -> UploadConfig {
        UploadConfig {
            part_size,
            max_concurrency: concurrency,
            multipart_threshold: threshold,
            ..Default::default()
        }
    }

    #[test]
    fn test_below_threshold_is_single_shot() {
        let strategy = choose_strategy(2 * MB, &config(8 * MB, 5, 8 * MB)).unwrap();
        assert_eq!(strategy, UploadStrategy::SingleShot);
        assert_eq!(strategy.to_string(), "single-shot");
    }

    #[test]
    fn test_at_threshold_is_multipart() {
        let strategy = choose_strategy(8 * MB, &config(8 * MB, 5, 8 * MB)).unwrap();
        assert_eq!(
            strategy,
            UploadStrategy::Multipart {
                part_size: 8 * MB,
                concurrency: 1,
                part_count: 1
            }
        );
    }

    #[test]
    fn test_twenty_mb_in_eight_mb_parts() {
        let strategy = choose_strategy(20 * MB, &config(8 * MB, 3, 8 * MB)).unwrap();
        assert_eq!(
            strategy,
            UploadStrategy::Multipart {
                part_size: 8 * MB,
                concurrency: 3,
                part_count: 3
            }
        );
    }

    #[test]
    fn test_zero_bytes_single_shot() {
        assert_eq!(
            choose_strategy(0, &UploadConfig::default()).unwrap(),
            UploadStrategy::SingleShot
        );
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        for bad in [
            config(0, 5, 8 * MB),
            config(8 * MB, 0, 8 * MB),
            config(8 * MB, 9, 8 * MB),
            config(8 * MB, 5, 0),
        ] {
            assert!(matches!(
                choose_strategy(20 * MB, &bad),
                Err(UploadError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_part_size_grows_past_part_limit() {
        let size = 100_000 * MB;
        match choose_strategy(size, &config(MB, 8, MB)).unwrap() {
            UploadStrategy::Multipart {
                part_size,
                part_count,
                ..
            } => {
                assert_eq!(part_size, size.div_ceil(MAX_PARTS));
                assert!(part_count <= MAX_PARTS);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_oversized_threshold_never_routes_to_single_shot() {
        let gib = 1024 * MB;
        assert!(matches!(
            choose_strategy(6 * gib, &config(8 * MB, 5, 8 * gib)),
            Err(UploadError::InvalidConfiguration(_))
        ));

        // Largest allowed threshold still sends anything over the put limit multipart
        let largest = config(8 * MB, 5, MAX_SINGLE_SHOT_SIZE);
        let strategy = choose_strategy(6 * gib, &largest).unwrap();
        assert!(matches!(strategy, UploadStrategy::Multipart { .. }));
    }

    #[test]
    fn test_object_too_large() {
        let size = MAX_PARTS * MAX_PART_SIZE + 1;
        assert!(choose_strategy(size, &UploadConfig::default()).is_err());
    }
}
