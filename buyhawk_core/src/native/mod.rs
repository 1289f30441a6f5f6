// Native implementations of the RPC, HTTP, and storage seams.

pub mod http_impl;
pub mod rpc_impl;
pub mod storage_impl;

pub use http_impl::NativeHttpClient;
pub use rpc_impl::NativeRpcClient;
pub use storage_impl::FileStorage;
