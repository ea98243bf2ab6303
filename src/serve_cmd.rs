//! Serve command implementation
//!
//! Runs the newline-delimited JSON-RPC server over stdio (default) or TCP.

use anyhow::Result;
use sextant::rpc::{serve_stdio, serve_tcp, RpcServer};

pub fn run_serve(tcp: Option<u16>) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let server = RpcServer::new();

    runtime.block_on(async move {
        match tcp {
            Some(port) => serve_tcp(server, port).await,
            None => serve_stdio(server).await,
        }
    })?;

    Ok(0)
}
