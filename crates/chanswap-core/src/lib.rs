pub mod errors;
pub mod events;
pub mod ids;
pub mod items;

pub use errors::CoordinatorError;
pub use events::{ChannelEvent, Envelope, Stats, Target};
pub use ids::{ConnectionId, ItemId};
pub use items::{Item, NewItem};
