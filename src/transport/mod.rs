// MIT License - Copyright (c) 2021 TJForc
// Transport layer

pub mod direct;

pub use direct::{
    connect, split, split_lines, LineReader, LineWriter, CLIENT_TERMINATOR, SERVER_TERMINATOR,
};
