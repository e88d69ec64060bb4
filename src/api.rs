#![allow(non_snake_case)]
use std::os::raw::c_void;

use libloading::{Library, Symbol};

use crate::sys::*;

/// Names of the entry points every table must resolve, in resolution order.
pub const SYMBOLS: [&str; 4] = ["bcp_initW", "bcp_bind", "bcp_sendrow", "bcp_done"];

/// Anything symbols can be looked up in. Implemented for [`Library`]; tests
/// plug in tables of `extern "C"` fakes.
pub trait SymbolSource {
    /// Address of the NUL-terminated symbol `name`.
    ///
    /// # Safety
    ///
    /// The returned address is reinterpreted as a function pointer of the BCP
    /// signature registered for `name`; it must really be one.
    unsafe fn address(&self, name: &[u8]) -> Result<*const c_void, String>;
}

impl SymbolSource for Library {
    unsafe fn address(&self, name: &[u8]) -> Result<*const c_void, String> {
        let sym: Symbol<*const c_void> = self.get(name).map_err(|e| e.to_string())?;
        Ok(*sym)
    }
}

/// Failure to resolve one entry point.
#[derive(Debug)]
pub struct SymbolError {
    pub symbol: &'static str,
    pub detail: String,
}

pub struct Api {
    pub bcp_initW: bcp_initW_fn,
    pub bcp_bind: bcp_bind_fn,
    pub bcp_sendrow: bcp_sendrow_fn,
    pub bcp_done: bcp_done_fn,
}

impl Api {
    /// Resolve all four entry points; either every one resolves or an error
    /// naming the first missing symbol is returned.
    pub unsafe fn load<S: SymbolSource + ?Sized>(src: &S) -> Result<Self, SymbolError> {
        unsafe fn get<T: Copy, S: SymbolSource + ?Sized>(
            src: &S,
            symbol: &'static str,
            name: &'static [u8],
        ) -> Result<T, SymbolError> {
            let addr = src
                .address(name)
                .map_err(|detail| SymbolError { symbol, detail })?;
            if addr.is_null() {
                return Err(SymbolError {
                    symbol,
                    detail: "symbol resolved to null".into(),
                });
            }
            debug_assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<*const c_void>());
            Ok(std::mem::transmute_copy::<*const c_void, T>(&addr))
        }
        Ok(Self {
            bcp_initW: get(
                src,
                stringify!(bcp_initW),
                concat!(stringify!(bcp_initW), "\0").as_bytes(),
            )?,
            bcp_bind: get(
                src,
                stringify!(bcp_bind),
                concat!(stringify!(bcp_bind), "\0").as_bytes(),
            )?,
            bcp_sendrow: get(
                src,
                stringify!(bcp_sendrow),
                concat!(stringify!(bcp_sendrow), "\0").as_bytes(),
            )?,
            bcp_done: get(
                src,
                stringify!(bcp_done),
                concat!(stringify!(bcp_done), "\0").as_bytes(),
            )?,
        })
    }
}
