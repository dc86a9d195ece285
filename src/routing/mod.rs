//! Routing: which destinations receive a message.

pub mod matcher;
pub mod model;
pub mod repository;

pub use matcher::resolve;
pub use model::{
    AuthType, ContentSelection, Format, HtmlMode, Route, RouteConfig, RoutingDocument,
    RoutingTable, SlackOptions, TransformationConfig, TransformationOptions,
};
pub use repository::{FileRouteRepository, RouteRepository, StaticRouteRepository};
