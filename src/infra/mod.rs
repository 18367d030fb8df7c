pub mod http_client;
pub mod ws_client;

pub use http_client::ReqwestLogQuery;
pub use ws_client::TungsteniteConnector;
