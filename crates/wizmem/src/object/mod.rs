pub mod actor;
pub mod enums;
pub mod fields;
pub mod view;

pub use actor::ActorBody;
pub use enums::DuelPhase;
pub use fields::{EnumField, Field, StrField, XyzField};
pub use view::{BaseResolver, ObjectView, Xyz};
