use tally_core::error::{Result, TallyError};

/// Splits `items` into consecutive chunks of at most `max_size` elements.
///
/// Concatenating the chunks gives back `items`. Empty input yields no chunks.
pub fn partition<T>(max_size: usize, items: &[T]) -> Result<Vec<&[T]>> {
    if max_size == 0 {
        return Err(TallyError::Config(
            "partition size must be at least 1".to_string(),
        ));
    }
    Ok(items.chunks(max_size).collect())
}
