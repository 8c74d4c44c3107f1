pub mod codeforces;
pub mod markdown;
pub mod segments;
