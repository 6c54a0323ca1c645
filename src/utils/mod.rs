// Utils module - progress output, network probing and downloads
pub mod download;
pub mod networking;
pub mod progress;
pub mod string;

pub use download::{Downloader, HttpDownloader};
pub use networking::{NetworkProbe, SystemNetwork};
pub use string::first_token;
