// CacheLink Agent - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fs;
pub mod paths;
pub mod protocol;
pub mod session;
pub mod tunnel;
