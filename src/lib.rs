//! # Audio Jobs
//! src/lib.rs
//!
//! Orquestador HTTP/1.0 de jobs largos de audio: separación de stems
//! (voz / instrumental) y generación de canciones a partir de letra y género.
//! Cada job corre fuera del request, con progreso, logs y cancelación
//! consultables por polling.
//!
//! ## Arquitectura
//!
//! - `http`: Parsing y armado de mensajes HTTP/1.0
//! - `server`: Listener TCP y manejo de conexiones
//! - `router`: Enrutamiento de peticiones a handlers
//! - `jobs`: Registro, runner y servicios de separación y generación
//! - `config`: Configuración por CLI y variables de entorno
//! - `error`: Errores tipados de los jobs
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use audio_jobs::config::Config;
//! use audio_jobs::server::Server;
//!
//! let config = Config::default();
//! let server = Server::new(config);
//! server.run().expect("Error al iniciar servidor");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod router;
pub mod server;
