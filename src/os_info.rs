pub const NO_PROCESS: &str = "<NO PROCESS>";
pub const NO_PATH: &str = "<NO PATH>";

#[cfg(target_os = "windows")]
pub fn process_image_path(pid: u64) -> String {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION};
    let Ok(pid) = u32::try_from(pid) else { return NO_PROCESS.to_string() };
    unsafe {
        let h = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if h.is_null() { return NO_PROCESS.to_string(); }
        let mut buf = [0u16; 1024];
        let mut size = buf.len() as u32;
        let ok = QueryFullProcessImageNameW(h, PROCESS_NAME_WIN32, buf.as_mut_ptr(), &mut size);
        CloseHandle(h);
        if ok == 0 { return NO_PATH.to_string(); }
        String::from_utf16_lossy(&buf[..size as usize])
    }
}

#[cfg(not(target_os = "windows"))]
pub fn process_image_path(pid: u64) -> String {
    match std::fs::read_link(format!("/proc/{}/exe", pid)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => NO_PROCESS.to_string(),
        Err(_) => NO_PATH.to_string(),
    }
}

#[cfg(target_os = "windows")]
fn system_message(status: u32) -> Option<String> {
    use windows_sys::Win32::System::Diagnostics::Debug::{FormatMessageW, FORMAT_MESSAGE_FROM_HMODULE, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS};
    use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
    let ntdll: Vec<u16> = "ntdll.dll".encode_utf16().chain(std::iter::once(0)).collect();
    let mut buf = [0u16; 512];
    let n = unsafe {
        let module = GetModuleHandleW(ntdll.as_ptr());
        let flags = FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS | if module.is_null() { 0 } else { FORMAT_MESSAGE_FROM_HMODULE };
        FormatMessageW(flags, module as *const _, status, 0, buf.as_mut_ptr(), buf.len() as u32, std::ptr::null())
    };
    if n == 0 { return None; }
    let s = String::from_utf16_lossy(&buf[..n as usize]);
    let s = s.trim_end_matches(['\r', '\n', ' ']).to_string();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(not(target_os = "windows"))]
fn system_message(status: u32) -> Option<String> {
    let s = match status {
        0x0000_0000 => "STATUS_SUCCESS",
        0x0000_0103 => "STATUS_PENDING",
        0x0000_0104 => "STATUS_REPARSE",
        0x8000_0005 => "STATUS_BUFFER_OVERFLOW",
        0x8000_0006 => "STATUS_NO_MORE_FILES",
        0xC000_000D => "STATUS_INVALID_PARAMETER",
        0xC000_000F => "STATUS_NO_SUCH_FILE",
        0xC000_0022 => "STATUS_ACCESS_DENIED",
        0xC000_0023 => "STATUS_BUFFER_TOO_SMALL",
        0xC000_0034 => "STATUS_OBJECT_NAME_NOT_FOUND",
        0xC000_0035 => "STATUS_OBJECT_NAME_COLLISION",
        0xC000_003A => "STATUS_OBJECT_PATH_NOT_FOUND",
        0xC000_0043 => "STATUS_SHARING_VIOLATION",
        0xC000_00BA => "STATUS_FILE_IS_A_DIRECTORY",
        0xC000_0103 => "STATUS_NOT_A_DIRECTORY",
        _ => return None,
    };
    Some(s.to_string())
}

/// Best-effort text for an NTSTATUS completion code.
pub fn status_text(status: u32) -> String {
    system_message(status).unwrap_or_else(|| format!("Unknown NTSTATUS: 0x{:08X}", status))
}
