/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Codec layer for editing Android boot images: page alignment, packing of the
//! version header fields, the component content digest, and extraction and
//! placement of component slices.
//!
//! The header layouts themselves are supplied by the caller. Decoding of the
//! extracted components is delegated to external tools (see [`tool`]).

pub mod cli;
pub mod config;
pub mod format;
pub mod pipeline;
pub mod stream;
pub mod tool;
pub mod util;
