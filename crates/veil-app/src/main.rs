#![warn(missing_docs)]
//! # veil-app binary
//!
//! Desktop entry point for veil.

/// CLI entry point.
fn main() {
    #[cfg(windows)]
    {
        if let Err(error) = win32_ui::run_main_window() {
            eprintln!("failed to start veil overlay: {error}");
            std::process::exit(1);
        }
    }

    #[cfg(not(windows))]
    {
        println!("veil-app {}", veil_app::app_version());
        println!(
            "shield_enabled={} (VEIL_SHIELD_ENABLED)",
            veil_app::shield_enabled_from_env()
        );
        match veil_app::generate_endpoint_from_env() {
            Ok(endpoint) => println!("generate_endpoint={endpoint}"),
            Err(error) => println!("generate_endpoint=invalid ({error})"),
        }
    }
}

#[cfg(windows)]
mod win32_ui {
    //! Native Win32 overlay shell with capture shielding, streamed chat
    //! controls, runtime status projection, and per-run file logging.
    //!
    //! Control writes that notify the parent (WM_SETTEXT, EM_REPLACESEL,
    //! focus moves) are staged under the controller borrow and sent after it
    //! is released; nested controller access reports busy instead of
    //! panicking inside the window procedure.

    use std::cell::RefCell;
    use std::ffi::c_void;
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::path::PathBuf;
    use std::ptr::{null, null_mut};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
    use std::sync::{Mutex, OnceLock};

    use time::OffsetDateTime;
    use veil_affinity::{AffinityError, AffinityMode, CaptureShield, WindowHandle, detect_backend};
    use veil_app::{
        StreamEvent, app_version, apply_stream_event, generate_endpoint_from_env,
        prepare_submission, project_runtime_status, record_user_message, run_chat_stream,
        shield_enabled_from_env,
    };
    use veil_chat::{CancelToken, ChatClient, GenerateRequest};
    use veil_core::{StreamId, Transcript, available_models};
    use veil_ui::{OverlayUiState, ShieldProjection, incremental_suffix, render_transcript};
    use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
    use windows_sys::Win32::Graphics::Gdi::{BeginPaint, COLOR_WINDOW, EndPaint, PAINTSTRUCT};
    use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{EnableWindow, SetFocus, VK_RETURN};
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        BN_CLICKED, BS_PUSHBUTTON, CB_ADDSTRING, CB_ERR, CB_GETCURSEL, CB_SETCURSEL,
        CBN_SELCHANGE, CBS_DROPDOWNLIST, CS_HREDRAW, CS_VREDRAW, CreateWindowExW, DefWindowProcW,
        DestroyWindow, DispatchMessageW, ES_AUTOHSCROLL, ES_AUTOVSCROLL, ES_MULTILINE,
        ES_READONLY, GetMessageW, GetWindowTextLengthW, GetWindowTextW, IDC_ARROW, KillTimer,
        LWA_ALPHA, LoadCursorW, MSG, PostMessageW, PostQuitMessage, RegisterClassW, SW_SHOW,
        SendMessageW, SetLayeredWindowAttributes, SetTimer, SetWindowTextW, ShowWindow,
        TranslateMessage, WM_APP, WM_CLOSE, WM_COMMAND, WM_DESTROY, WM_KEYDOWN, WM_PAINT,
        WM_TIMER, WNDCLASSW, WS_BORDER, WS_CHILD, WS_EX_LAYERED, WS_EX_TOPMOST, WS_POPUP,
        WS_TABSTOP, WS_VISIBLE, WS_VSCROLL,
    };

    const CONTROL_ID_TRANSCRIPT_EDIT: i32 = 1001;
    const CONTROL_ID_INPUT_EDIT: i32 = 1002;
    const CONTROL_ID_MODEL_COMBO: i32 = 1003;
    const CONTROL_ID_SEND_BUTTON: i32 = 1004;
    const CONTROL_ID_STOP_BUTTON: i32 = 1005;
    const CONTROL_ID_CLOSE_BUTTON: i32 = 1006;

    const TIMER_SHIELD_APPLY_ID: usize = 1;
    const SHIELD_APPLY_DELAY_MS: u32 = 100;
    // 92% opacity, matching the layered-overlay look.
    const WINDOW_ALPHA: u8 = 235;
    const WINDOW_X: i32 = 200;
    const WINDOW_Y: i32 = 200;
    const WINDOW_WIDTH: i32 = 420;
    const WINDOW_HEIGHT: i32 = 560;
    const WM_CHAT_WORKER_EVENT: u32 = WM_APP + 1;

    // Edit-control message values, fixed by the Win32 ABI.
    const EM_SETSEL: u32 = 0x00B1;
    const EM_SCROLLCARET: u32 = 0x00B7;
    const EM_REPLACESEL: u32 = 0x00C2;
    const EM_SETREADONLY: u32 = 0x00CF;

    static RUN_LOGGER: OnceLock<RunLogger> = OnceLock::new();
    static FIRST_PAINT_LOGGED: AtomicBool = AtomicBool::new(false);

    std::thread_local! {
        static OVERLAY_CONTROLLER: RefCell<Option<OverlayController>> = const { RefCell::new(None) };
    }

    struct RunLogger {
        file: Mutex<File>,
        path: PathBuf,
    }

    impl RunLogger {
        fn new() -> Result<Self, String> {
            let exe_path = std::env::current_exe()
                .map_err(|error| format!("unable to resolve executable path: {error}"))?;
            let exe_dir = exe_path
                .parent()
                .ok_or_else(|| "executable parent directory is missing".to_string())?
                .to_path_buf();

            let timestamp = timestamp_compact_utc();
            let path = exe_dir.join(format!("{timestamp}_log.txt"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|error| {
                    format!("unable to create log file '{}': {error}", path.display())
                })?;

            Ok(Self {
                file: Mutex::new(file),
                path,
            })
        }

        fn write_line(&self, level: &str, stage: &str, action: &str, detail: &str) {
            let timestamp = timestamp_compact_utc();
            let line = format!("{timestamp} | {level} | {stage} | {action} | {detail}\n");

            if let Ok(mut file) = self.file.lock() {
                let _ = file.write_all(line.as_bytes());
                if level == "ERROR" {
                    let _ = file.flush();
                }
            }
        }
    }

    #[derive(Default)]
    struct ControlHandles {
        transcript_edit: HWND,
        input_edit: HWND,
        model_combo: HWND,
        send_button: HWND,
        stop_button: HWND,
        close_button: HWND,
        shield_status: HWND,
        stream_status: HWND,
    }

    struct OverlayController {
        ui_state: OverlayUiState,
        transcript: Transcript,
        shield: Option<CaptureShield>,
        endpoint: String,
        controls: ControlHandles,
        // Last full render staged for the transcript edit, before CRLF
        // conversion; streaming appends are computed as its suffix.
        rendered_transcript: String,
        transcript_utf16_len: usize,
        next_stream_id: u64,
        current_stream: Option<(StreamId, CancelToken)>,
        event_tx: Sender<(StreamId, StreamEvent)>,
        event_rx: Receiver<(StreamId, StreamEvent)>,
    }

    impl OverlayController {
        fn new() -> Result<Self, String> {
            let endpoint = generate_endpoint_from_env()
                .map_err(|error| format!("generate endpoint override rejected: {error}"))?;
            let (event_tx, event_rx) = mpsc::channel();

            Ok(Self {
                ui_state: OverlayUiState::new(app_version()),
                transcript: Transcript::new(),
                shield: None,
                endpoint,
                controls: ControlHandles::default(),
                rendered_transcript: String::new(),
                transcript_utf16_len: 0,
                next_stream_id: 0,
                current_stream: None,
                event_tx,
                event_rx,
            })
        }

        fn allocate_stream(&mut self) -> StreamId {
            self.next_stream_id += 1;
            StreamId::new(self.next_stream_id)
        }
    }

    /// Starts the UI event loop and blocks until the user closes the overlay.
    pub fn run_main_window() -> Result<(), String> {
        initialize_logger()?;
        log_info(
            "bootstrap",
            "startup",
            &format!(
                "version={} shield_enabled={}",
                app_version(),
                shield_enabled_from_env()
            ),
        );

        let controller = OverlayController::new()?;
        log_info(
            "bootstrap",
            "endpoint",
            &format!("generate_endpoint={}", controller.endpoint),
        );
        OVERLAY_CONTROLLER.with(|slot| {
            *slot.borrow_mut() = Some(controller);
        });

        let instance = unsafe {
            // Safety:
            // - Passing null requests the current process module instance handle.
            GetModuleHandleW(null())
        };
        if instance.is_null() {
            let message = "GetModuleHandleW returned null".to_string();
            log_error("startup", "module_handle", &message);
            return Err(message);
        }

        let class_name = to_wide("VeilOverlayWindowClass");
        let cursor = unsafe {
            // Safety:
            // - Uses predefined system cursor identifier.
            LoadCursorW(null_mut(), IDC_ARROW)
        };

        let window_class = WNDCLASSW {
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            lpszClassName: class_name.as_ptr(),
            hCursor: cursor,
            hbrBackground: (COLOR_WINDOW as usize + 1) as *mut c_void,
            ..unsafe {
                // Safety:
                // - Zero-initialization for unused optional fields is valid.
                std::mem::zeroed()
            }
        };

        let atom = unsafe {
            // Safety:
            // - `window_class` is fully initialized and points to stable memory.
            RegisterClassW(&window_class)
        };
        if atom == 0 {
            let message = "RegisterClassW failed".to_string();
            log_error("startup", "register_class", &message);
            return Err(message);
        }

        let title = to_wide(&format!("veil {}", app_version()));
        let hwnd = unsafe {
            // Safety:
            // - Class and title pointers are valid for the call.
            // - `instance` is a process module handle returned by Win32.
            CreateWindowExW(
                WS_EX_LAYERED | WS_EX_TOPMOST,
                class_name.as_ptr(),
                title.as_ptr(),
                WS_POPUP | WS_BORDER | WS_VISIBLE,
                WINDOW_X,
                WINDOW_Y,
                WINDOW_WIDTH,
                WINDOW_HEIGHT,
                null_mut(),
                null_mut(),
                instance,
                null_mut(),
            )
        };
        if hwnd.is_null() {
            let message = "CreateWindowExW failed".to_string();
            log_error("startup", "create_window", &message);
            return Err(message);
        }

        unsafe {
            // Safety:
            // - `hwnd` carries WS_EX_LAYERED, so alpha attributes apply.
            SetLayeredWindowAttributes(hwnd, 0, WINDOW_ALPHA, LWA_ALPHA);
        }

        let _ = with_controller_mut(|controller| {
            controller.shield = Some(CaptureShield::new(
                WindowHandle::new(hwnd as isize),
                detect_backend(),
            ));
            Ok(())
        });

        create_ui_controls(hwnd, instance)?;

        unsafe {
            // Safety:
            // - `hwnd` is a valid window handle created above.
            ShowWindow(hwnd, SW_SHOW);
        }

        // EN_SETFOCUS re-enters the window procedure, so focus moves only
        // after the controller borrow is released.
        if let Ok(input_edit) = with_controller_mut(|controller| Ok(controller.controls.input_edit))
        {
            unsafe {
                // Safety:
                // - Input edit is a live child control of this window.
                SetFocus(input_edit);
            }
        }

        // The shield applies on a short one-shot timer so the window is fully
        // realized before its styles are rewritten.
        let timer = unsafe {
            // Safety:
            // - Main window handle is valid, timer id is process-local.
            SetTimer(hwnd, TIMER_SHIELD_APPLY_ID, SHIELD_APPLY_DELAY_MS, None)
        };
        if timer == 0 {
            log_error(
                "shield",
                "timer",
                "SetTimer failed; applying shield without settle delay",
            );
            apply_capture_shield();
        }

        refresh_status_texts().map_err(|error| {
            log_error("ui", "refresh_status_texts", &error);
            error
        })?;

        log_info("event_loop", "begin", "message loop started");
        let mut message: MSG = unsafe {
            // Safety:
            // - Zero-initialization before first `GetMessageW` is valid.
            std::mem::zeroed()
        };

        loop {
            let result = unsafe {
                // Safety:
                // - `message` pointer remains valid across loop iterations.
                GetMessageW(&mut message, null_mut(), 0, 0)
            };
            if result == -1 {
                let message = "GetMessageW returned -1".to_string();
                log_error("event_loop", "get_message", &message);
                return Err(message);
            }
            if result == 0 {
                log_info("event_loop", "end", "WM_QUIT received");
                break;
            }

            // Return inside the input edit submits; key messages are
            // delivered to the focused control.
            if message.message == WM_KEYDOWN && message.wParam == VK_RETURN as usize {
                let input_edit = with_controller_mut(|controller| {
                    Ok(controller.controls.input_edit as isize)
                })
                .unwrap_or_default();
                if input_edit != 0 && message.hwnd as isize == input_edit {
                    handle_return_submit(hwnd);
                    continue;
                }
            }

            unsafe {
                // Safety:
                // - `message` contents came from `GetMessageW`.
                TranslateMessage(&message);
                DispatchMessageW(&message);
            }
        }

        Ok(())
    }

    extern "system" fn window_proc(
        hwnd: HWND,
        message: u32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        match message {
            WM_COMMAND => {
                handle_command(hwnd, w_param);
                0
            }
            WM_TIMER => {
                if w_param == TIMER_SHIELD_APPLY_ID {
                    handle_shield_timer(hwnd);
                }
                0
            }
            WM_CHAT_WORKER_EVENT => {
                handle_chat_worker_events();
                0
            }
            WM_PAINT => {
                if !FIRST_PAINT_LOGGED.swap(true, Ordering::Relaxed) {
                    log_info("ui", "first_paint", "first paint message processed");
                }

                let mut paint = unsafe {
                    // Safety:
                    // - Zero-initialization is valid for `PAINTSTRUCT`.
                    std::mem::zeroed::<PAINTSTRUCT>()
                };
                unsafe {
                    // Safety:
                    // - `hwnd` is provided by Win32 for paint processing.
                    let _paint_hdc = BeginPaint(hwnd, &mut paint);
                    EndPaint(hwnd, &paint);
                }
                0
            }
            WM_CLOSE => {
                let _ = with_controller_mut(|controller| {
                    reset_capture_shield(controller);
                    Ok(())
                });
                log_info("ui", "close", "close requested; window will be destroyed");
                unsafe {
                    // Safety:
                    // - Default handling destroys the window.
                    DefWindowProcW(hwnd, message, w_param, l_param)
                }
            }
            WM_DESTROY => {
                let _ = with_controller_mut(|controller| {
                    reset_capture_shield(controller);
                    if let Some((stream, token)) = controller.current_stream.take() {
                        token.cancel();
                        log_info(
                            "chat",
                            "cancel_on_teardown",
                            &format!("stream={}", stream.value()),
                        );
                    }
                    Ok(())
                });
                log_info("ui", "destroy", "window destroyed; posting quit");
                unsafe {
                    // Safety:
                    // - Ends the message loop on main thread.
                    PostQuitMessage(0);
                }
                0
            }
            _ => unsafe {
                // Safety:
                // - Delegate unhandled messages to default Win32 behavior.
                DefWindowProcW(hwnd, message, w_param, l_param)
            },
        }
    }

    fn create_ui_controls(hwnd: HWND, instance: *mut c_void) -> Result<(), String> {
        with_controller_mut(|controller| {
            let mut controls = ControlHandles::default();

            let static_style = WS_CHILD | WS_VISIBLE;
            let transcript_style = WS_CHILD
                | WS_VISIBLE
                | WS_BORDER
                | WS_VSCROLL
                | ES_MULTILINE as u32
                | ES_AUTOVSCROLL as u32
                | ES_READONLY as u32;
            let input_style = WS_CHILD | WS_VISIBLE | WS_BORDER | WS_TABSTOP | ES_AUTOHSCROLL as u32;
            let button_style = WS_CHILD | WS_VISIBLE | WS_TABSTOP | BS_PUSHBUTTON as u32;
            let combo_style =
                WS_CHILD | WS_VISIBLE | WS_TABSTOP | WS_VSCROLL | CBS_DROPDOWNLIST as u32;

            controls.transcript_edit = create_child_control(
                hwnd,
                instance,
                "EDIT",
                "",
                transcript_style,
                10,
                10,
                400,
                330,
                CONTROL_ID_TRANSCRIPT_EDIT,
            )?;

            controls.shield_status = create_child_control(
                hwnd,
                instance,
                "STATIC",
                "",
                static_style,
                10,
                348,
                400,
                18,
                0,
            )?;

            controls.stream_status = create_child_control(
                hwnd,
                instance,
                "STATIC",
                "",
                static_style,
                10,
                368,
                400,
                18,
                0,
            )?;

            let _model_label = create_child_control(
                hwnd,
                instance,
                "STATIC",
                "Model:",
                static_style,
                10,
                394,
                50,
                20,
                0,
            )?;

            controls.model_combo = create_child_control(
                hwnd,
                instance,
                "COMBOBOX",
                "",
                combo_style,
                64,
                390,
                346,
                200,
                CONTROL_ID_MODEL_COMBO,
            )?;

            controls.input_edit = create_child_control(
                hwnd,
                instance,
                "EDIT",
                "",
                input_style,
                10,
                424,
                400,
                26,
                CONTROL_ID_INPUT_EDIT,
            )?;

            controls.send_button = create_child_control(
                hwnd,
                instance,
                "BUTTON",
                "Send",
                button_style,
                10,
                460,
                128,
                30,
                CONTROL_ID_SEND_BUTTON,
            )?;

            controls.stop_button = create_child_control(
                hwnd,
                instance,
                "BUTTON",
                "Stop",
                button_style,
                146,
                460,
                128,
                30,
                CONTROL_ID_STOP_BUTTON,
            )?;

            controls.close_button = create_child_control(
                hwnd,
                instance,
                "BUTTON",
                "Close",
                button_style,
                282,
                460,
                128,
                30,
                CONTROL_ID_CLOSE_BUTTON,
            )?;

            for model in available_models() {
                let wide = to_wide(model.display_name);
                unsafe {
                    // Safety:
                    // - Combo box handle is valid; strings are copied by control.
                    SendMessageW(controls.model_combo, CB_ADDSTRING, 0, wide.as_ptr() as LPARAM);
                }
            }

            let default_index = available_models()
                .iter()
                .position(|model| model.id == controller.ui_state.selected_model)
                .unwrap_or(0);
            unsafe {
                // Safety:
                // - Valid combo box handle and a catalog-bounded index.
                SendMessageW(controls.model_combo, CB_SETCURSEL, default_index, 0);
            }

            unsafe {
                // Safety:
                // - Stop button handle is valid; no stream is live yet.
                EnableWindow(controls.stop_button, 0);
            }

            controller.controls = controls;

            log_info(
                "ui",
                "controls_created",
                &format!(
                    "model_count={} default_model={}",
                    available_models().len(),
                    controller.ui_state.selected_model
                ),
            );

            Ok(())
        })
    }

    fn handle_command(hwnd: HWND, w_param: WPARAM) {
        let control_id = loword(w_param) as i32;
        let notification = hiword(w_param) as u32;

        let result = match control_id {
            CONTROL_ID_SEND_BUTTON if notification == BN_CLICKED as u32 => handle_send_click(hwnd),
            CONTROL_ID_STOP_BUTTON if notification == BN_CLICKED as u32 => handle_stop_click(),
            CONTROL_ID_CLOSE_BUTTON if notification == BN_CLICKED as u32 => {
                handle_close_click(hwnd)
            }
            CONTROL_ID_MODEL_COMBO if notification == CBN_SELCHANGE as u32 => {
                handle_model_selection_change()
            }
            _ => Ok(()),
        };

        if let Err(error) = result {
            report_ui_failure(error);
        }

        let _ = refresh_status_texts();
    }

    fn handle_return_submit(hwnd: HWND) {
        if let Err(error) = handle_send_click(hwnd) {
            report_ui_failure(error);
        }
        let _ = refresh_status_texts();
    }

    fn report_ui_failure(error: String) {
        log_error("ui", "command", &error);
        let update = with_controller_mut(|controller| {
            controller.transcript.push_system(format!("[ui error: {error}]"));
            Ok(stage_transcript_update(controller))
        });
        if let Ok(Some(update)) = update {
            push_transcript_update(update);
        }
    }

    fn handle_send_click(hwnd: HWND) -> Result<(), String> {
        let view_effects = with_controller_mut(|controller| {
            let raw_input = read_control_text(controller.controls.input_edit)?;
            let model_id = controller.ui_state.selected_model.clone();

            let Some(submission) = prepare_submission(&raw_input, &model_id) else {
                log_info("chat", "submit_ignored", "input empty after trim");
                return Ok(None);
            };

            record_user_message(&mut controller.transcript, &submission)
                .map_err(|error| format!("transcript user append failed: {error}"))?;

            let stream = controller.allocate_stream();
            let token = CancelToken::new();
            // A newer submission replaces the token reachable from Stop; the
            // superseded stream keeps running into its own slot.
            controller.current_stream = Some((stream, token.clone()));
            controller.ui_state.on_stream_started();

            log_info(
                "chat",
                "submit",
                &format!(
                    "stream={} model={} input_len={}",
                    stream.value(),
                    submission.request.model,
                    submission.display_text.len()
                ),
            );

            spawn_chat_worker(
                hwnd as isize,
                controller.endpoint.clone(),
                submission.request,
                stream,
                token,
                controller.event_tx.clone(),
            )?;

            Ok(Some((
                controller.controls.input_edit,
                stage_transcript_update(controller),
            )))
        })?;

        // Clearing the input (WM_SETTEXT), moving focus (EN_SETFOCUS), and
        // the transcript append (EM_REPLACESEL) all notify the parent, so
        // they run after the controller borrow is released.
        if let Some((input_edit, transcript_update)) = view_effects {
            if let Some(update) = transcript_update {
                push_transcript_update(update);
            }
            set_control_text(input_edit, "");
            unsafe {
                // Safety:
                // - Input edit is a live child control of this window.
                SetFocus(input_edit);
            }
        }
        Ok(())
    }

    fn handle_stop_click() -> Result<(), String> {
        with_controller_mut(|controller| {
            let Some((stream, token)) = controller.current_stream.as_ref() else {
                log_info("chat", "stop_ignored", "no live stream to cancel");
                return Ok(());
            };

            token.cancel();
            log_info(
                "chat",
                "stop",
                &format!("stream={} cancel requested", stream.value()),
            );
            Ok(())
        })
    }

    fn handle_close_click(hwnd: HWND) -> Result<(), String> {
        let _ = with_controller_mut(|controller| {
            reset_capture_shield(controller);
            Ok(())
        });
        log_info("ui", "close_click", "destroying overlay window");
        unsafe {
            // Safety:
            // - `hwnd` is the live top-level window owned by this thread.
            DestroyWindow(hwnd);
        }
        Ok(())
    }

    fn handle_model_selection_change() -> Result<(), String> {
        with_controller_mut(|controller| {
            let selection_index = unsafe {
                // Safety:
                // - Combo box handle is valid.
                SendMessageW(controller.controls.model_combo, CB_GETCURSEL, 0, 0)
            };

            if selection_index == CB_ERR as isize {
                return Ok(());
            }

            if let Some(model) = available_models().get(selection_index as usize) {
                controller.ui_state.select_model(model.id);
                log_info(
                    "model",
                    "selection_changed",
                    &format!("selected_model={}", model.id),
                );
            }
            Ok(())
        })
    }

    fn handle_shield_timer(hwnd: HWND) {
        unsafe {
            // Safety:
            // - Timer ID is owned by this window; the apply delay is one-shot.
            KillTimer(hwnd, TIMER_SHIELD_APPLY_ID);
        }
        apply_capture_shield();
        let _ = refresh_status_texts();
    }

    fn apply_capture_shield() {
        let result = with_controller_mut(|controller| {
            if !shield_enabled_from_env() {
                controller.ui_state.set_shield(ShieldProjection::Disabled);
                log_info(
                    "shield",
                    "apply_skipped",
                    "disabled by VEIL_SHIELD_ENABLED kill switch",
                );
                return Ok(());
            }

            let shield = controller
                .shield
                .as_mut()
                .ok_or_else(|| "capture shield is not initialized".to_string())?;
            let report = shield.apply();
            let projection = match report.mode {
                AffinityMode::ExcludedFromCapture => ShieldProjection::CaptureExcluded,
                AffinityMode::MonitorOnly => ShieldProjection::MonitorOnly,
                AffinityMode::Normal => ShieldProjection::Unprotected,
            };
            controller.ui_state.set_shield(projection);

            let detail = format!(
                "mode={:?} style_hidden={} style_error={} exclude_error={} monitor_error={}",
                report.mode,
                report.style_hidden,
                affinity_error_label(report.style_error.as_ref()),
                affinity_error_label(report.exclude_error.as_ref()),
                affinity_error_label(report.monitor_error.as_ref()),
            );
            if report.is_protected() {
                log_info("shield", "applied", &detail);
            } else {
                log_error("shield", "apply_failed", &detail);
            }
            Ok(())
        });

        if let Err(error) = result {
            log_error("shield", "apply", &error);
        }
    }

    fn reset_capture_shield(controller: &mut OverlayController) {
        let Some(shield) = controller.shield.as_mut() else {
            return;
        };

        let report = shield.reset();
        if report.is_clean() {
            log_info(
                "shield",
                "reset",
                &format!(
                    "style_restored={} affinity_cleared={}",
                    report.style_restored, report.affinity_cleared
                ),
            );
        } else {
            let errors = report
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            log_error("shield", "reset_incomplete", &errors);
        }
    }

    fn handle_chat_worker_events() {
        let result = with_controller_mut(|controller| {
            let mut drained_events = Vec::new();
            loop {
                match controller.event_rx.try_recv() {
                    Ok(event) => drained_events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        return Err("chat worker channel disconnected".to_string());
                    }
                }
            }

            for (stream, event) in drained_events {
                match &event {
                    StreamEvent::Fragment(_) => {}
                    StreamEvent::Completed => {
                        settle_stream(controller, stream, false);
                        log_info(
                            "chat",
                            "stream_completed",
                            &format!("stream={}", stream.value()),
                        );
                    }
                    StreamEvent::Failed(detail) => {
                        settle_stream(controller, stream, true);
                        log_error(
                            "chat",
                            "stream_failed",
                            &format!("stream={} detail={detail}", stream.value()),
                        );
                    }
                }
                apply_stream_event(&mut controller.transcript, stream, event);
            }

            Ok(stage_transcript_update(controller))
        });

        match result {
            Ok(Some(update)) => push_transcript_update(update),
            Ok(None) => {}
            Err(error) => log_error("chat_worker", "event_drain", &error),
        }

        let _ = refresh_status_texts();
    }

    fn settle_stream(controller: &mut OverlayController, stream: StreamId, failed: bool) {
        if failed {
            controller.ui_state.on_stream_failed();
        } else {
            controller.ui_state.on_stream_settled();
        }

        let is_current = controller
            .current_stream
            .as_ref()
            .is_some_and(|(current, _)| *current == stream);
        if is_current {
            controller.current_stream = None;
        }
    }

    // A pending transcript-edit write. EM_REPLACESEL and WM_SETTEXT notify
    // the parent synchronously, so the write is staged under the controller
    // borrow and sent only after it is released.
    enum TranscriptViewUpdate {
        Append {
            edit: HWND,
            start: usize,
            text_utf16: Vec<u16>,
        },
        Replace {
            edit: HWND,
            text_utf16: Vec<u16>,
        },
    }

    fn stage_transcript_update(controller: &mut OverlayController) -> Option<TranscriptViewUpdate> {
        let rendered = render_transcript(&controller.transcript);
        let update = match incremental_suffix(&controller.rendered_transcript, &rendered) {
            Some("") => None,
            Some(suffix) => {
                let text_utf16 = to_wide(&to_display_line_endings(suffix));
                let start = controller.transcript_utf16_len;
                controller.transcript_utf16_len = start + (text_utf16.len() - 1);
                Some(TranscriptViewUpdate::Append {
                    edit: controller.controls.transcript_edit,
                    start,
                    text_utf16,
                })
            }
            None => {
                let text_utf16 = to_wide(&to_display_line_endings(&rendered));
                controller.transcript_utf16_len = text_utf16.len() - 1;
                Some(TranscriptViewUpdate::Replace {
                    edit: controller.controls.transcript_edit,
                    text_utf16,
                })
            }
        };
        controller.rendered_transcript = rendered;
        update
    }

    fn push_transcript_update(update: TranscriptViewUpdate) {
        match update {
            TranscriptViewUpdate::Append {
                edit,
                start,
                text_utf16,
            } => unsafe {
                // Safety:
                // - Transcript edit handle is valid; the read-only state is
                //   restored after the programmatic append.
                SendMessageW(edit, EM_SETREADONLY, 0, 0);
                SendMessageW(edit, EM_SETSEL, start, start as LPARAM);
                SendMessageW(edit, EM_REPLACESEL, 0, text_utf16.as_ptr() as LPARAM);
                SendMessageW(edit, EM_SETREADONLY, 1, 0);
                SendMessageW(edit, EM_SCROLLCARET, 0, 0);
            },
            TranscriptViewUpdate::Replace { edit, text_utf16 } => {
                unsafe {
                    // Safety:
                    // - Transcript edit handle is valid and the UTF-16 buffer
                    //   is null-terminated.
                    SetWindowTextW(edit, text_utf16.as_ptr());
                }

                let end = text_utf16.len() - 1;
                unsafe {
                    // Safety:
                    // - Caret indices are clamped by the control.
                    SendMessageW(edit, EM_SETSEL, end, end as LPARAM);
                    SendMessageW(edit, EM_SCROLLCARET, 0, 0);
                }
            }
        }
    }

    fn refresh_status_texts() -> Result<(), String> {
        with_controller_mut(|controller| {
            let runtime = project_runtime_status(&controller.ui_state);
            set_control_text(controller.controls.shield_status, &runtime.shield);
            set_control_text(
                controller.controls.stream_status,
                &format!(
                    "{} | model={} | live_streams={}",
                    runtime.stream, runtime.selected_model, runtime.live_streams
                ),
            );

            let stop_enabled = controller.current_stream.is_some();
            unsafe {
                // Safety:
                // - Stop button handle is valid.
                EnableWindow(controller.controls.stop_button, i32::from(stop_enabled));
            }
            Ok(())
        })
    }

    fn spawn_chat_worker(
        hwnd_value: isize,
        endpoint: String,
        request: GenerateRequest,
        stream: StreamId,
        token: CancelToken,
        event_tx: Sender<(StreamId, StreamEvent)>,
    ) -> Result<(), String> {
        // Workers are detached; teardown cancels the reachable token and
        // process exit closes any still-open socket.
        std::thread::Builder::new()
            .name(format!("veil-chat-worker-{}", stream.value()))
            .spawn(move || {
                let client = match ChatClient::with_default_transport(&endpoint) {
                    Ok(client) => client,
                    Err(error) => {
                        let _ = event_tx.send((stream, StreamEvent::Failed(error.to_string())));
                        notify_chat_worker_event(hwnd_value);
                        return;
                    }
                };

                run_chat_stream(&client, &request, token, |event| {
                    let _ = event_tx.send((stream, event));
                    notify_chat_worker_event(hwnd_value);
                });
            })
            .map_err(|error| format!("failed to spawn chat worker thread: {error}"))?;

        Ok(())
    }

    fn notify_chat_worker_event(hwnd_value: isize) {
        unsafe {
            // Safety:
            // - Posts a custom message to the UI thread queue; no pointers are
            //   transferred.
            PostMessageW(hwnd_value as HWND, WM_CHAT_WORKER_EVENT, 0, 0);
        }
    }

    fn with_controller_mut<F, T>(f: F) -> Result<T, String>
    where
        F: FnOnce(&mut OverlayController) -> Result<T, String>,
    {
        OVERLAY_CONTROLLER.with(|slot| {
            // Child-control notifications re-enter the window procedure
            // synchronously; nested access reports busy instead of letting a
            // borrow panic unwind the `extern "system"` frame.
            let mut maybe_controller = slot
                .try_borrow_mut()
                .map_err(|_| "overlay controller is busy in an outer frame".to_string())?;
            let controller = maybe_controller
                .as_mut()
                .ok_or_else(|| "overlay controller is not initialized".to_string())?;
            f(controller)
        })
    }

    fn affinity_error_label(error: Option<&AffinityError>) -> String {
        error.map_or_else(|| "none".to_string(), ToString::to_string)
    }

    fn create_child_control(
        parent: HWND,
        instance: *mut c_void,
        class_name: &str,
        text: &str,
        style: u32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        control_id: i32,
    ) -> Result<HWND, String> {
        let class_name_wide = to_wide(class_name);
        let text_wide = to_wide(text);

        let hwnd = unsafe {
            // Safety:
            // - Input pointers are stable for this call and parent/instance handles are valid.
            CreateWindowExW(
                0,
                class_name_wide.as_ptr(),
                text_wide.as_ptr(),
                style,
                x,
                y,
                width,
                height,
                parent,
                control_id_to_hmenu(control_id),
                instance,
                null(),
            )
        };

        if hwnd.is_null() {
            return Err(format!(
                "failed to create control class={class_name} id={control_id}"
            ));
        }

        Ok(hwnd)
    }

    fn set_control_text(control: HWND, text: &str) {
        let wide = to_wide(text);
        unsafe {
            // Safety:
            // - `control` is a live child HWND and UTF-16 pointer is valid for call.
            SetWindowTextW(control, wide.as_ptr());
        }
    }

    fn read_control_text(control: HWND) -> Result<String, String> {
        let length = unsafe {
            // Safety:
            // - `control` is a valid edit control handle.
            GetWindowTextLengthW(control)
        };
        if length < 0 {
            return Err("GetWindowTextLengthW failed".to_string());
        }

        let mut buffer = vec![0_u16; length as usize + 1];
        let written = unsafe {
            // Safety:
            // - Buffer is large enough for text + null terminator.
            GetWindowTextW(control, buffer.as_mut_ptr(), buffer.len() as i32)
        };
        if written < 0 {
            return Err("GetWindowTextW failed".to_string());
        }

        Ok(String::from_utf16_lossy(&buffer[..written as usize]))
    }

    fn initialize_logger() -> Result<(), String> {
        if RUN_LOGGER.get().is_some() {
            return Ok(());
        }

        let logger = RunLogger::new()?;
        let path = logger.path.display().to_string();
        let _ = RUN_LOGGER.set(logger);
        log_info("logging", "file_created", &format!("log_file={path}"));
        Ok(())
    }

    fn log_info(stage: &str, action: &str, detail: &str) {
        if let Some(logger) = RUN_LOGGER.get() {
            logger.write_line("INFO", stage, action, detail);
        }
    }

    fn log_error(stage: &str, action: &str, detail: &str) {
        if let Some(logger) = RUN_LOGGER.get() {
            logger.write_line("ERROR", stage, action, detail);
        }
    }

    fn control_id_to_hmenu(control_id: i32) -> *mut c_void {
        control_id as usize as *mut c_void
    }

    fn loword(value: usize) -> u16 {
        (value & 0xFFFF) as u16
    }

    fn hiword(value: usize) -> u16 {
        ((value >> 16) & 0xFFFF) as u16
    }

    fn timestamp_compact_utc() -> String {
        let now = OffsetDateTime::now_utc();
        format!(
            "{:04}{:02}{:02}_{:02}{:02}{:02}",
            now.year(),
            now.month() as u8,
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        )
    }

    fn to_display_line_endings(text: &str) -> String {
        text.replace('\n', "\r\n")
    }

    fn to_wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

}
