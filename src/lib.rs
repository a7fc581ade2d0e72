//! PixelFE floating-selection engine: marquee regions, lift / transform /
//! commit of pixel-art selections, and the undo history that replays them.
#![allow(clippy::too_many_arguments)]
#![allow(clippy::large_enum_variant)]

#[macro_use]
pub mod logger;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod guides;
pub mod io;
pub mod ops;
pub mod project;
pub mod selection;
pub mod settings;
