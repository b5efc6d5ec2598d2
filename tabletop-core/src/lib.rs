//! # tabletop-core — Board model, diff and merge for a shared tabletop
//!
//! Pure model code: no networking, no storage. Everything here is driven
//! by the sync layer in `tabletop-sync`.
//!
//! ## Data flow
//!
//! ```text
//! ┌─────────────┐  to_remote   ┌──────────────────┐
//! │ BoardModel  │ ───────────► │ RemoteBoardModel │ ◄── validate / fill_defaults
//! │ (editing)   │              │ (wire, storage)  │
//! └─────────────┘              └────────┬─────────┘
//!        ▲                              │ compute_between(new, old)
//!        │ create_from_remote           ▼
//!        │ (ImageLoader)       ┌──────────────────┐
//!        └──────────────────── │ RemoteBoardDiff  │ ── merged_with ──► new model
//!                              └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`coordinates`] — `Location`, `Point`, tile distance
//! - [`grid`] — column-major `Grid<T>`, grid sizing, rectangular areas
//! - [`cells`] — fog of war and highlight cell values
//! - [`token`] — `TokenData` and the id-keyed `TokenSet`
//! - [`remote`] — `RemoteBoardModel` and its validation
//! - [`diff`] — `RemoteBoardDiff::compute_between`
//! - [`merge`] — `RemoteBoardModel::merged_with`
//! - [`image`] — async image loading seam
//! - [`board`] — `BoardModel`, the in-memory editing model

pub mod board;
pub mod cells;
pub mod coordinates;
pub mod diff;
pub mod error;
pub mod grid;
pub mod image;
pub mod merge;
pub mod remote;
pub mod token;

pub use board::BoardModel;
pub use cells::{FogState, Highlight};
pub use coordinates::{modulo, tile_distance, Location, Point};
pub use diff::{CellChange, RemoteBoardDiff, TokenMove};
pub use error::{BoardError, IdMismatchError, ImageLoadError, ValidationError};
pub use grid::{apply_area, grid_dimensions, Grid, GridSize, SimpleArea, MAX_GRID_AXIS, MAX_GRID_CELLS};
pub use image::{load_images, FsImageLoader, ImageLoader, LoadedImage, StaticImageLoader};
pub use remote::RemoteBoardModel;
pub use token::{TokenData, TokenSet, DEFAULT_SPEED};
