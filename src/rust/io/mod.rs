// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod bridge;
pub mod demux;
pub mod epoll;
pub mod net;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    bridge::IoBridge,
    demux::{
        EventDemultiplexer,
        Interest,
        ReadinessCallback,
    },
    epoll::Epoll,
    net::{
        TcpListener,
        TcpStream,
    },
};
