#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use rigreg_3d as r3d;

#[doc(inline)]
pub use rigreg_io as io;

#[doc(inline)]
pub use rigreg_icp as icp;

#[doc(inline)]
pub use rigreg_calib as calib;
