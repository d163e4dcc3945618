//! HTTPS transport: DNS + TCP, BoringSSL handshake, HTTP/1.1 framing.

pub mod connector;
pub mod h1;
pub mod tcp;
