pub mod sim;

pub use sim::{
    ActorInfo, BlueprintInfo, FrameInfo, Location, RequestFrame, ResponseFrame, Rotation,
    SimRequest, SimResponse, Transform, SIM_PROTOCOL_VERSION,
};
