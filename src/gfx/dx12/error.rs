//! HRESULT 到 RHI 错误的映射

use windows::Win32::Foundation::{E_INVALIDARG, E_OUTOFMEMORY};
use windows::Win32::Graphics::Dxgi::{
    DXGI_ERROR_DEVICE_HUNG, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET,
    DXGI_ERROR_DRIVER_INTERNAL_ERROR,
};

use crate::core::error::RhiError;

/// 把原生错误转换成 RHI 错误，并附上出错的调用
pub(crate) fn map_error(context: &str, err: windows::core::Error) -> RhiError {
    let code = err.code();
    let msg = format!("{}: {} ({:#010x})", context, err.message(), code.0);

    if code == DXGI_ERROR_DEVICE_REMOVED
        || code == DXGI_ERROR_DEVICE_HUNG
        || code == DXGI_ERROR_DEVICE_RESET
        || code == DXGI_ERROR_DRIVER_INTERNAL_ERROR
    {
        RhiError::DeviceLost(msg)
    } else if code == E_OUTOFMEMORY {
        RhiError::OutOfMemory(msg)
    } else if code == E_INVALIDARG {
        RhiError::InvalidParameter(msg)
    } else {
        RhiError::Backend(msg)
    }
}

pub(crate) trait HResultExt<T> {
    fn rhi(self, context: &str) -> crate::core::error::Result<T>;
}

impl<T> HResultExt<T> for windows::core::Result<T> {
    fn rhi(self, context: &str) -> crate::core::error::Result<T> {
        self.map_err(|err| map_error(context, err))
    }
}
