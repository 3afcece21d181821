pub mod documentation;
pub mod events;
pub mod room_actor;
pub mod room_service;
pub mod scoring;
pub mod websocket_service;
