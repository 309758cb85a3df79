/// Decoder bitness of the running target
#[cfg(target_arch = "x86_64")]
pub const BITNESS: u32 = 64;
#[cfg(target_arch = "x86")]
pub const BITNESS: u32 = 32;
