pub mod directory_downloader;
pub mod local_destination;
