/// `HRESULT_FROM_WIN32(ERROR_INVALID_HANDLE)`: the kernel side of the port is gone.
pub const HR_INVALID_HANDLE: i32 = 0x8007_0006u32 as i32;
/// `HRESULT_FROM_WIN32(ERROR_NO_MORE_ITEMS)`: the driver queue is empty.
pub const HR_NO_MORE_ITEMS: i32 = 0x8007_0103u32 as i32;

/// `MINISPY_COMMAND::GetMiniSpyLog`.
pub const GET_MINISPY_LOG: u32 = 0;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod, Debug, Default)]
pub struct CommandMessage {
    pub command: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Data(usize),
    HandleInvalid,
    NoMoreItems,
    Failed(i32),
}

impl ChannelStatus {
    pub fn from_hresult(hr: i32, bytes_returned: u32) -> Self {
        match hr {
            h if h >= 0 => ChannelStatus::Data(bytes_returned as usize),
            HR_INVALID_HANDLE => ChannelStatus::HandleInvalid,
            HR_NO_MORE_ITEMS => ChannelStatus::NoMoreItems,
            h => ChannelStatus::Failed(h),
        }
    }
}

/// One "get log" round trip: fill `buf`, report what happened.
pub trait LogChannel {
    fn get_log(&mut self, buf: &mut [u8]) -> ChannelStatus;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Could not connect to filter port {port}: 0x{hr:08X}")]
    Connect { port: String, hr: u32 },
    #[error("filter communication ports are only available on Windows")]
    Unsupported,
}

#[cfg(target_os = "windows")]
pub struct FilterPort {
    handle: windows_sys::Win32::Foundation::HANDLE,
}

// The port handle is only ever used by the thread that owns the FilterPort.
#[cfg(target_os = "windows")]
unsafe impl Send for FilterPort {}

#[cfg(target_os = "windows")]
impl FilterPort {
    pub fn connect(name: &str) -> Result<Self, ChannelError> {
        use windows_sys::Win32::Storage::InstallableFileSystems::FilterConnectCommunicationPort;
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let mut handle = std::ptr::null_mut();
        let hr = unsafe { FilterConnectCommunicationPort(wide.as_ptr(), 0, std::ptr::null(), 0, std::ptr::null(), &mut handle) };
        if hr < 0 { return Err(ChannelError::Connect { port: name.to_string(), hr: hr as u32 }); }
        log::info!("Connected to {}", name);
        Ok(Self { handle })
    }
}

#[cfg(target_os = "windows")]
impl LogChannel for FilterPort {
    fn get_log(&mut self, buf: &mut [u8]) -> ChannelStatus {
        use windows_sys::Win32::Storage::InstallableFileSystems::FilterSendMessage;
        let cmd = CommandMessage { command: GET_MINISPY_LOG, reserved: 0 };
        let mut bytes_returned = 0u32;
        let hr = unsafe {
            FilterSendMessage(self.handle, (&cmd as *const CommandMessage).cast(), std::mem::size_of::<CommandMessage>() as u32,
                buf.as_mut_ptr().cast(), buf.len() as u32, &mut bytes_returned)
        };
        ChannelStatus::from_hresult(hr, bytes_returned)
    }
}

#[cfg(target_os = "windows")]
impl Drop for FilterPort {
    fn drop(&mut self) {
        unsafe { windows_sys::Win32::Foundation::CloseHandle(self.handle); }
    }
}

#[cfg(not(target_os = "windows"))]
pub struct FilterPort;

#[cfg(not(target_os = "windows"))]
impl FilterPort {
    pub fn connect(_name: &str) -> Result<Self, ChannelError> { Err(ChannelError::Unsupported) }
}

#[cfg(not(target_os = "windows"))]
impl LogChannel for FilterPort {
    fn get_log(&mut self, _buf: &mut [u8]) -> ChannelStatus { ChannelStatus::HandleInvalid }
}
