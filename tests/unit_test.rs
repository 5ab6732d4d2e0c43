//! Entry point for the component-level tests under `tests/unit/`.

mod unit;
