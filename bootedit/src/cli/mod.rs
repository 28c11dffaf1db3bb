/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

pub mod args;
pub mod boot;
pub mod completion;
pub mod ramdisk;
pub mod version;

macro_rules! status {
    ($($arg:tt)*) => {
        println!("\x1b[1m[*] {}\x1b[0m", format!($($arg)*))
    }
}

pub(crate) use status;
