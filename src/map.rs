use crate::types::{DrawableShape, Viewport};

/// The map widget the pipeline reads from and draws into.
///
/// Implementations must be shareable across threads: tiles are delivered from
/// worker threads while the host keeps panning.
pub trait MapWidget: Send + Sync {
    /// Current visible bounds.
    fn viewport(&self) -> Viewport;

    /// Adds a filled, unstroked polygon to the map.
    fn add_polygon(&self, shape: DrawableShape);
}
