pub mod buffer;
pub mod http;
pub mod simulate;
pub mod transport;
pub mod types;
pub mod wire;

pub use buffer::{FrameBuffer, Ingest};
pub use http::{HttpTransport, HttpTransportConfig};
pub use simulate::{
    RoutePoints, SimulatedTransport, SimulationConfig, route_points, streetview_url,
};
pub use transport::{
    ChannelHandle, ChannelTransport, InboundReceiver, InboundSender, SentCommand, Transport,
    inbound_channel,
};
pub use types::{Direction, Frame, Generation, Inbound, TransportError, UnknownDirection};
pub use wire::{FrameEvent, StartStream, WireError, decode_event};
