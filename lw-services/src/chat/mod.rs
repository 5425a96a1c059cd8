//! Chat protocol: line codec, framing, typed events, filtering and the client.

pub mod client;
pub mod events;
pub mod filter;
pub mod framer;
pub mod parser;

pub use client::{ChannelPhase, ChatClient, Credentials, ReplyTo};
pub use events::{
    Badge, ChatMessage, ClearChat, ClearMessage, GlobalUserState, MembershipChange,
    MembershipKind, NoticeKind, RoomState, ServerNotice, UserNotice, UserState,
};
pub use filter::MessageFilter;
pub use framer::LineBuffer;
pub use parser::{IrcMessage, Prefix, Tags};
