pub mod color;
pub mod color_removal;
pub mod coords;
pub mod crop;
pub mod export;
pub mod filters;
pub mod flood_fill;
pub mod shapes;
