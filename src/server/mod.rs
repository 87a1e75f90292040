//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor TCP que:
//! 1. Escucha en un puerto
//! 2. Acepta conexiones entrantes (un thread por conexión)
//! 3. Lee el request completo, con body acotado por `Content-Length`
//! 4. Despacha al router de jobs y envía la respuesta

pub mod tcp;

// Re-exportar para facilitar el uso
pub use tcp::Server;
