//! Foreground window check so input only lands in the game window.

#[cfg(windows)]
fn foreground_title() -> Option<String> {
    use windows_sys::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW};

    let mut buf = [0u16; 512];
    // SAFETY: the buffer outlives the call and its length is passed along.
    let len = unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.is_null() {
            return None;
        }
        GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32)
    };
    (len > 0).then(|| String::from_utf16_lossy(&buf[..len as usize]))
}

#[cfg(not(windows))]
fn foreground_title() -> Option<String> {
    None
}

/// True when `target` is empty, or the foreground window title contains it
/// (case-insensitive). Platforms without a title query always pass.
pub fn target_window_active(target: &str) -> bool {
    if target.trim().is_empty() || cfg!(not(windows)) {
        return true;
    }
    title_matches(foreground_title().as_deref(), target)
}

fn title_matches(title: Option<&str>, target: &str) -> bool {
    title.is_some_and(|t| t.to_lowercase().contains(&target.trim().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_target_always_passes() {
        assert!(target_window_active(""));
        assert!(target_window_active("   "));
    }

    #[test]
    fn title_match_is_case_insensitive() {
        assert!(title_matches(Some("Roblox"), "roblox"));
        assert!(title_matches(Some("ROBLOX - Drive World"), "Roblox"));
        assert!(!title_matches(Some("Notepad"), "roblox"));
        assert!(!title_matches(None, "roblox"));
    }
}
