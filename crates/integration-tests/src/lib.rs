//! Empty library: this crate exists for its `tests/` directory.
