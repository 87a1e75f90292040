//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea `(método, path)` a handlers que reciben el estado compartido.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → Router → Handler(&Request, &S) → Response
//! ```
//!
//! Path desconocido → 404. Path conocido con otro método → 405 con header
//! `Allow`.

use crate::http::{Method, Request, Response, StatusCode};

/// Tipo de función handler
///
/// Un handler recibe el Request y el estado compartido del servidor
pub type Handler<S> = fn(&Request, &S) -> Response;

struct Route<S> {
    method: Method,
    path: String,
    handler: Handler<S>,
}

/// Router que mapea método + path a handlers
pub struct Router<S> {
    routes: Vec<Route<S>>,
}

impl<S> Router<S> {
    /// Crea un nuevo router vacío
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registra una ruta con su handler
    ///
    /// # Ejemplo
    /// ```
    /// use audio_jobs::router::Router;
    /// use audio_jobs::http::{Method, Request, Response};
    ///
    /// fn hello(_req: &Request, greeting: &String) -> Response {
    ///     Response::json(&serde_json::json!({ "message": greeting }))
    /// }
    ///
    /// let mut router = Router::new();
    /// router.register(Method::GET, "/hello", hello);
    ///
    /// let request = Request::parse(b"GET /hello HTTP/1.0\r\n\r\n").unwrap();
    /// let response = router.route(&request, &"hola".to_string());
    /// assert!(response.status().is_success());
    /// ```
    pub fn register(&mut self, method: Method, path: &str, handler: Handler<S>) {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler,
        });
    }

    /// Encuentra y ejecuta el handler apropiado para un request
    pub fn route(&self, request: &Request, state: &S) -> Response {
        let path = request.path();

        let mut allowed: Vec<&'static str> = Vec::new();
        for route in self.routes.iter().filter(|r| r.path == path) {
            if route.method == request.method() {
                let mut response = (route.handler)(request, state);
                Self::add_common_headers(&mut response);
                return response;
            }
            allowed.push(route.method.as_str());
        }

        let mut response = if allowed.is_empty() {
            Response::error(StatusCode::NotFound, &format!("Route not found: {}", path))
        } else {
            Response::error(
                StatusCode::MethodNotAllowed,
                &format!("Method {} not allowed for {}", request.method().as_str(), path),
            )
            .with_header("Allow", &allowed.join(", "))
        };
        Self::add_common_headers(&mut response);
        response
    }

    /// Agrega headers comunes a todas las respuestas
    fn add_common_headers(response: &mut Response) {
        response.add_header("Server", "audio-jobs/0.1");
        response.add_header("Connection", "close");
    }
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_state(_req: &Request, state: &u32) -> Response {
        Response::json(&serde_json::json!({ "state": state }))
    }

    fn ok(_req: &Request, _state: &u32) -> Response {
        Response::json(&serde_json::json!({ "ok": true }))
    }

    fn parse(raw: &[u8]) -> Request {
        Request::parse(raw).unwrap()
    }

    #[test]
    fn test_route_found_receives_state() {
        let mut router = Router::new();
        router.register(Method::GET, "/state", echo_state);

        let response = router.route(&parse(b"GET /state HTTP/1.0\r\n\r\n"), &7);

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body(), br#"{"state":7}"#);
        assert_eq!(response.header("Connection"), Some("close"));
    }

    #[test]
    fn test_route_not_found() {
        let router: Router<u32> = Router::new();
        let response = router.route(&parse(b"GET /nonexistent HTTP/1.0\r\n\r\n"), &0);
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_wrong_method_is_405() {
        let mut router = Router::new();
        router.register(Method::POST, "/jobs/cancel", ok);

        let response = router.route(&parse(b"GET /jobs/cancel HTTP/1.0\r\n\r\n"), &0);

        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(response.header("Allow"), Some("POST"));
    }

    #[test]
    fn test_same_path_different_methods() {
        let mut router = Router::new();
        router.register(Method::GET, "/jobs", echo_state);
        router.register(Method::POST, "/jobs", ok);

        let get = router.route(&parse(b"GET /jobs HTTP/1.0\r\n\r\n"), &1);
        let post = router.route(&parse(b"POST /jobs HTTP/1.0\r\n\r\n"), &1);

        assert_eq!(get.body(), br#"{"state":1}"#);
        assert_eq!(post.body(), br#"{"ok":true}"#);
    }
}
