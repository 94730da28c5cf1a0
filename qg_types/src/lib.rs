pub mod clock;
pub mod request_type;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use request_type::ParseRequestTypeError;
pub use request_type::RequestType;
