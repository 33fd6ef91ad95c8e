//! HTTP handlers for the generated resource routes.

pub mod entity;
pub use entity::*;
