//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod networks {
    pub const LIST: &str = "/networks";
    pub const DETAIL: &str = "/networks/:nwid";
}

pub fn network_path(network_id: &str) -> String {
    networks::DETAIL.replace(":nwid", network_id)
}
