use std::os::raw::c_void;

pub(crate) type MecabModelHandle = *mut c_void;
pub(crate) type MecabTaggerHandle = *mut c_void;
pub(crate) type MecabLatticeHandle = *mut c_void;
