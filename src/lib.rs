#![doc = include_str!("../README.md")]

pub mod asm;
pub mod c;
pub mod diag;
pub mod plat;
