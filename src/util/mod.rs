/// Union-find over contiguous indices.
pub mod unionfind;
