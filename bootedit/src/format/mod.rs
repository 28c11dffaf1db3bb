/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

pub mod assemble;
pub mod compression;
pub mod digest;
pub mod padding;
pub mod slice;
pub mod version;
