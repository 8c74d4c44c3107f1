pub mod codeforces;
pub mod leetcode;

use serde::{Deserialize, Deserializer};

/// Treats an explicit JSON `null` like a missing field. Upstream APIs are
/// not schema-checked, so any optional field may come back null.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
