//! Rust library for controlling Denon/Marantz HEOS devices
//!
//! This library provides an async client for the HEOS command-line protocol
//! that HEOS speakers and receivers expose on TCP port 1255. It supports:
//!
//! - SSDP discovery of devices on the local network
//! - Commands with responses, serialized over one connection
//! - Change events pushed by the device, dispatched to subscribers
//! - Paged listings (browse, search) collected in full
//! - Positional queue edits on top of append/remove-only queue commands
//!
//! # Quick Start
//!
//! ```no_run
//! use heos_control::{discover, events, ClientConfig, HeosClient, MediaRef};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Find devices
//!     let devices = discover(Duration::from_secs(3), 1, 3).await?;
//!     let Some(device) = devices.first() else {
//!         return Ok(());
//!     };
//!
//!     // Connect and listen for queue changes
//!     let client = HeosClient::for_device(device, ClientConfig::default())?;
//!     client.subscribe(events::PLAYER_QUEUE_CHANGED, |event| async move {
//!         println!("Queue changed on player {:?}", event.var("pid"));
//!     });
//!     client.connect().await?;
//!
//!     // Put a track second in the queue of the first player
//!     let players = client.get_players().await?;
//!     let Some(player) = players.first() else {
//!         return Ok(());
//!     };
//!     let mut queue = client.queue(player.pid);
//!     queue.insert(1, &MediaRef::track(1024, "albums/42", "tracks/7")).await?;
//!     for item in queue.items() {
//!         println!("{}. {} - {}", item.qid, item.artist, item.song);
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Discovery**: SSDP M-SEARCH for `urn:schemas-denon-com:device:ACT-Denon:1`
//! - **Client**: Session owning the command channel and the event pump
//! - **Queue**: Insert, replace and delete at arbitrary queue positions
//! - **Paging**: Fetch-until-exhausted loop behind browse and search
//! - **Channel**: Request/response framing, de-duplication and delay notices
//! - **Connection**: TCP transport with delimiter-based reads
//! - **Protocol**: Command encoding and response frame decoding
//! - **Types**: Domain records

mod browse;
mod channel;
mod client;
mod config;
mod connection;
mod discovery;
mod error;
mod paging;
mod player;
mod protocol;
mod queue;
mod subscription;
mod system;
mod types;

// Public exports
pub use browse::MAX_SEARCH_LENGTH;
pub use channel::CommandChannel;
pub use client::HeosClient;
pub use config::{ClientConfig, ReaderOptions, DEFAULT_PORT};
pub use connection::Connection;
pub use discovery::{discover, parse_ssdp_response, Discovery, DiscoveryConfig, HEOS_SEARCH_TARGET};
pub use error::{CommandFailure, ErrorCode, HeosError, Result, SystemErrorCode};
pub use paging::{fetch_all, ItemRange, Page, PAGE_SIZE};
pub use player::MAX_QUEUE_PAGE;
pub use protocol::{
    decode_frame, decode_value, encode_value, encode_var_string, parse_var_string, Command,
    CommandResult, HeosResult, Payload, ResultHeader, Vars,
};
pub use queue::PlayQueue;
pub use subscription::{events, Event, EventCallback, EventPump, Subscriptions};
pub use types::{
    extract_host, AccountStatus, AddToQueueType, BrowseItem, DeviceDescriptor, MediaRef,
    MusicSource, Player, PlayerId, QueueItem, SourceId,
};
