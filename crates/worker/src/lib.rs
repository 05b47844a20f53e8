//! # adbfs Worker Library
//!
//! Exposes the filesystems of Android devices reachable through `adb` as a
//! browsable `adb://` hierarchy for a file manager running the worker out of
//! process.
//!
//! ## Overview
//!
//! - `adb:/` lists the connected devices, one directory per device
//! - `adb://<device>` redirects to `adb://<device>/`
//! - `adb://<device>/<path>` lists `<path>` on the device via `ls -l -a`
//!
//! Free-space queries run `df` on the device. Every other file operation is
//! accepted and completes without doing anything.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   ipc: framed Unix socket to the host        │
//! ├──────────────────────────────────────────────┤
//! │   dispatch: Envelope -> Worker call          │
//! ├──────────────────────────────────────────────┤
//! │   worker: Worker trait, AdbWorker            │
//! ├──────────────────────────────────────────────┤
//! │   adb: bridge commands and output parsers    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use url::Url;
//! use worker::{AdbWorker, Listing, Worker};
//!
//! let worker = AdbWorker::default();
//! match worker.list_dir(&Url::parse("adb://emulator-5554/sdcard").unwrap()).unwrap() {
//!     Listing::Entries(entries) => {
//!         for entry in entries {
//!             println!("{:?} {}", entry.kind, entry.name);
//!         }
//!     }
//!     Listing::Redirect(url) => println!("see {}", url),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`adb`]: Bridge invocation and output parsing
//! - [`worker`]: The operation set and its adb implementation
//! - [`dispatch`]: Wire request handling
//! - [`ipc`]: Unix socket transport and client
//! - [`location`]: `adb://` url helpers
//! - [`config`]: Configuration loading and defaults
//! - [`logging`]: Tracing subscriber setup

pub mod adb;
pub mod config;
pub mod dispatch;
pub mod ipc;
pub mod location;
pub mod logging;
pub mod worker;

pub use adb::{AdbBridge, CommandRunner, Device, ProcessRunner, RemoteEntry, ScriptedRunner};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use worker::{AdbWorker, Listing, Worker, WorkerError, WorkerResult};
