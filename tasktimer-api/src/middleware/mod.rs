/// Middleware modules for the API server
///
/// - `identity`: resolves the acting user of each request

pub mod identity;
