pub mod health;
pub mod mcp_http;
pub mod resources;
pub mod tools;
