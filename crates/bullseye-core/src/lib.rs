//! Geometry and image primitives for planar bullseye target tracking.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! hold any detector state or shared pipeline machinery; those live in
//! `bullseye-track`.

mod homography;
mod hull;
mod image;
mod scoring;

pub use homography::{homography_from_4pt, plane_from_corners, Homography};
pub use hull::{convex_hull, order_corners, orientation, HULL_VERTEX_CAP};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayBuffer, GrayFrameView, Mask, RgbFrameView};
pub use scoring::{BullseyeModel, BullseyeModelError};
