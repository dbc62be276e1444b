//! Application-wide constants
//!
//! Vendor key names, store file names and the fixed values the camera
//! expects. Kept in one place so the on-device contract is easy to audit.

/// Camera preference key layout
pub mod keys {
    /// Prefix shared by every effect parameter key
    pub const EFFECT_PREFIX: &str = "key_master_mode_effect_";
}

/// Store files inside the camera's MMKV directory
pub mod stores {
    /// Store used for filter index 0
    pub const PREFERENCES: &str = "preferences_0";

    /// Shared store used for every filter index >= 1
    pub const SHARED: &str = "mmkv";

    /// Integrity sidecar suffix written next to each store file
    pub const CRC_SUFFIX: &str = ".crc";
}

/// Values the camera interprets specially
pub mod vendor {
    /// Vignette engaged at full strength
    pub const VIGNETTE_ON: i32 = 0;

    /// Vignette disabled. Lies outside the normal 0-100 effect range.
    pub const VIGNETTE_OFF: i32 = 101;

    /// Soft light disabled
    pub const SOFT_LIGHT_NONE: i32 = 0;

    /// Upper bound of a filter intensity suffix
    pub const MAX_INTENSITY: u32 = 100;
}

/// Capture file contract
pub mod capture {
    /// Mode preferred as the default active mode
    pub const DEFAULT_MODE: &str = "master-back";

    /// File name written by the hook under the camera's files directory
    pub const FILE_NAME: &str = "filter_capture.json";
}

/// Android paths and commands
pub mod android {
    /// Default camera package
    pub const CAMERA_PACKAGE: &str = "com.android.camera";

    /// Private data root of installed packages
    pub const DATA_ROOT: &str = "/data/data";

    /// Mode bits restored on patched store files (rw for owner and group)
    pub const STORE_FILE_MODE: &str = "660";

    /// Mode bits applied to scratch copies so this process can open them
    pub const SCRATCH_FILE_MODE: &str = "666";
}

/// Configuration file location
pub mod config {
    /// Directory under the platform config dir
    pub const APP_DIR: &str = "preset-inject";

    /// Config file name
    pub const FILENAME: &str = "config.json";
}

/// MMKV on-disk format
pub mod mmkv {
    /// Store files are sized in multiples of this
    pub const PAGE_SIZE: usize = 4096;

    /// Bytes taken by the little-endian payload size header
    pub const HEADER_LEN: usize = 4;

    /// Meta version from which the sidecar carries the actual size
    pub const META_VERSION_ACTUAL_SIZE: u32 = 3;

    /// Sidecar offsets (MMKVMetaInfo layout)
    pub const META_CRC_OFFSET: usize = 0;
    pub const META_VERSION_OFFSET: usize = 4;
    pub const META_ACTUAL_SIZE_OFFSET: usize = 28;
    pub const META_LAST_ACTUAL_SIZE_OFFSET: usize = 32;
    pub const META_LAST_CRC_OFFSET: usize = 36;
}
