//! WarpFE — GPU-accelerated interactive image warping.
//!
//! Paint displacement strokes over a photograph and preview the warped
//! result in real time, non-destructively: the source pixels are never
//! modified, only a ping-pong pair of displacement maps.  Undo/redo history
//! snapshots the map per stroke; export re-renders at source resolution,
//! either display-referred (PNG/JPEG/…) or linear HDR (Radiance RGBE).

#![allow(clippy::too_many_arguments)]

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod gpu;
pub mod io;
pub mod logger;
pub mod settings;
