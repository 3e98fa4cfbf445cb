//! Request queues: where parsed requests wait for the application.
//!
//! A request stays parked until a receive hands out its record, and its id
//! stays valid until the response is sent or the connection goes away.

mod request_queue;

pub use request_queue::IoStatus;
pub use request_queue::RequestQueue;
