//! Console tooling shared by the emulator and any future serial front-end.
//!
//! The command grammar lives in [`grammar`]. It lexes into a bounded token
//! buffer and parses without allocating, so it stays usable under `no_std`.

pub mod grammar;
