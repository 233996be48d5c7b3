#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tauri::{AppHandle, Manager};
use thiserror::Error;

const USERS_FILE: &str = "users.json";
const PROJECTS_FILE: &str = "projects.json";
const SETTINGS_FILE: &str = "settings.json";
const MIN_PASSWORD_LEN: usize = 6;
const SOLD_UNIT_STATUSES: [&str; 3] = ["contracted", "delivered", "sold"];
// Fields whose edited values are kept numeric when the input parses as a number.
const NUMERIC_UNIT_FIELDS: [&str; 4] = ["floor", "area", "meterPrice", "rooms"];
const ALL_PERMISSIONS: [Permission; 4] = [
    Permission::ViewDashboard,
    Permission::ViewProjects,
    Permission::ManageProjects,
    Permission::ManageUsers,
];
const DEFAULT_USER_PERMISSIONS: [Permission; 2] =
    [Permission::ViewDashboard, Permission::ViewProjects];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Language {
    #[default]
    En,
    Ar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Permission {
    ViewDashboard,
    ViewProjects,
    ManageProjects,
    ManageUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    username: String,
    // Stored and compared in plain text, mirroring the credential list this
    // app manages. This is a local convenience login, not a security boundary.
    password: String,
    role: Role,
    permissions: Vec<Permission>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct CurrentUser {
    username: String,
    role: Role,
    permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum ProjectStatus {
    #[default]
    Ongoing,
    Completed,
    Planned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum ProjectType {
    #[default]
    Residential,
    Commercial,
    #[serde(rename = "Mixed-Use")]
    MixedUse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Project {
    id: i64,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo: Option<String>,
    description: String,
    status: ProjectStatus,
    location: String,
    #[serde(rename = "type")]
    project_type: ProjectType,
    units: i64,
    completion_date: String,
    features: Vec<String>,
    unit_types: Vec<String>,
    detailed_units: Vec<UnitRecord>,
    gallery_images: Vec<String>,
}

/// What a spreadsheet cell (or an edited table cell) can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(number) => Some(*number),
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse::<f64>().ok()
                }
            }
            CellValue::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        }
    }

    fn to_text(&self) -> String {
        match self {
            CellValue::Number(number) => number.to_string(),
            CellValue::Text(text) => text.clone(),
            CellValue::Bool(flag) => flag.to_string(),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            CellValue::Number(number) => *number != 0.0,
            CellValue::Text(text) => !text.is_empty(),
            CellValue::Bool(flag) => *flag,
        }
    }
}

/// A normalized unit row: the recognized canonical fields plus every
/// unrecognized column carried through under its trimmed original header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UnitRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_code: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    building_type: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    floor: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    area: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ownership_status: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finishing: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rooms: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    building: Option<CellValue>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    unit_type: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    floor_status: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    views: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meter_price: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_status: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    garage: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finishing_situation_site: Option<CellValue>,
    #[serde(flatten)]
    extra: IndexMap<String, CellValue>,
}

impl UnitRecord {
    fn get(&self, field: &str) -> Option<&CellValue> {
        match field {
            "unitCode" => self.unit_code.as_ref(),
            "buildingType" => self.building_type.as_ref(),
            "floor" => self.floor.as_ref(),
            "area" => self.area.as_ref(),
            "ownershipStatus" => self.ownership_status.as_ref(),
            "finishing" => self.finishing.as_ref(),
            "zone" => self.zone.as_ref(),
            "rooms" => self.rooms.as_ref(),
            "building" => self.building.as_ref(),
            "type" => self.unit_type.as_ref(),
            "floorStatus" => self.floor_status.as_ref(),
            "category" => self.category.as_ref(),
            "views" => self.views.as_ref(),
            "meterPrice" => self.meter_price.as_ref(),
            "unitStatus" => self.unit_status.as_ref(),
            "garage" => self.garage.as_ref(),
            "finishingSituationSite" => self.finishing_situation_site.as_ref(),
            _ => self.extra.get(field),
        }
    }

    fn set(&mut self, field: &str, value: CellValue) {
        match field {
            "unitCode" => self.unit_code = Some(value),
            "buildingType" => self.building_type = Some(value),
            "floor" => self.floor = Some(value),
            "area" => self.area = Some(value),
            "ownershipStatus" => self.ownership_status = Some(value),
            "finishing" => self.finishing = Some(value),
            "zone" => self.zone = Some(value),
            "rooms" => self.rooms = Some(value),
            "building" => self.building = Some(value),
            "type" => self.unit_type = Some(value),
            "floorStatus" => self.floor_status = Some(value),
            "category" => self.category = Some(value),
            "views" => self.views = Some(value),
            "meterPrice" => self.meter_price = Some(value),
            "unitStatus" => self.unit_status = Some(value),
            "garage" => self.garage = Some(value),
            "finishingSituationSite" => self.finishing_situation_site = Some(value),
            _ => {
                self.extra.insert(field.to_string(), value);
            }
        }
    }

    fn unit_code_text(&self) -> String {
        self.unit_code
            .as_ref()
            .map(CellValue::to_text)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Filters {
    building_type: String,
    ownership_status: String,
    finishing: String,
}

impl Default for Filters {
    fn default() -> Self {
        Filters {
            building_type: "all".to_string(),
            ownership_status: "all".to_string(),
            finishing: "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortKey {
    Area,
    Floor,
}

impl SortKey {
    fn field(&self) -> &'static str {
        match self {
            SortKey::Area => "area",
            SortKey::Floor => "floor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Sort {
    key: SortKey,
    direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Sort {
            key: SortKey::Area,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterOptions {
    building_types: Vec<String>,
    ownership_statuses: Vec<String>,
    finishings: Vec<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnitSummary {
    total_units: i64,
    // Not clamped: inconsistent input surfaces as-is.
    available: i64,
    sold: i64,
    ats: i64,
    avg_area: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "name", content = "projectId", rename_all = "camelCase")]
enum View {
    #[default]
    Login,
    Dashboard,
    Projects,
    Users,
    ProjectDetail(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "source", content = "projectId", rename_all = "lowercase")]
enum UnitContext {
    #[default]
    Global,
    Project(i64),
}

/// Session-scoped state. Everything here is transient and reset on logout;
/// the global unit list in particular never touches disk.
#[derive(Debug, Default)]
struct SessionState {
    current_user: Option<CurrentUser>,
    view: View,
    unit_context: UnitContext,
    global_units: Vec<UnitRecord>,
    filters: Filters,
    sort: Sort,
    search_term: String,
}

#[derive(Debug, PartialEq, Error)]
enum AppError {
    #[error("Failed to read the file.")]
    FileRead,
    #[error("Invalid Excel format. Make sure the sheet has at least 'Unit Code' and 'Area' columns.")]
    InvalidFormat,
    #[error("Invalid username or password.")]
    Credential,
    #[error("You do not have permission to access any pages.")]
    AccessDenied,
    #[error("Username already exists.")]
    DuplicateUsername,
    #[error("Please fill out all required fields.")]
    EmptyField,
    #[error("Password must be at least 6 characters.")]
    PasswordTooShort,
    #[error("New passwords do not match.")]
    PasswordMismatch,
    #[error("Incorrect current password.")]
    IncorrectPassword,
    #[error("Project not found.")]
    ProjectNotFound,
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::FileRead => "file-read",
            AppError::InvalidFormat => "invalid-format",
            AppError::Credential => "credentials",
            AppError::AccessDenied => "no-access",
            AppError::DuplicateUsername => "duplicate-username",
            AppError::EmptyField => "empty-field",
            AppError::PasswordTooShort => "password-too-short",
            AppError::PasswordMismatch => "password-mismatch",
            AppError::IncorrectPassword => "incorrect-password",
            AppError::ProjectNotFound => "not-found",
            AppError::Storage(_) => "storage",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Settings {
    #[serde(default)]
    language: Language,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

#[derive(Deserialize)]
struct AddUserRequest {
    username: String,
    password: String,
    permissions: Option<Vec<Permission>>,
}

#[derive(Deserialize)]
struct RemoveUserRequest {
    username: String,
}

#[derive(Deserialize)]
struct SetPermissionsRequest {
    username: String,
    permissions: Vec<Permission>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSaveRequest {
    id: Option<i64>,
    name: Option<String>,
    logo: Option<String>,
    description: Option<String>,
    status: Option<ProjectStatus>,
    location: Option<String>,
    #[serde(rename = "type")]
    project_type: Option<ProjectType>,
    units: Option<i64>,
    completion_date: Option<String>,
    features: Option<Vec<String>>,
    unit_types: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ProjectDeleteRequest {
    id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GalleryAddRequest {
    project_id: i64,
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GalleryRemoveRequest {
    project_id: i64,
    index: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitsImportRequest {
    file_name: Option<String>,
    data: String,
    project_id: Option<i64>,
}

#[derive(Deserialize)]
struct UnitContextRequest {
    context: UnitContext,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitUpdateRequest {
    unit_code: String,
    field: String,
    value: CellValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FiltersPatchRequest {
    building_type: Option<String>,
    ownership_status: Option<String>,
    finishing: Option<String>,
}

#[derive(Deserialize)]
struct SortRequest {
    key: SortKey,
    direction: SortDirection,
}

#[derive(Deserialize)]
struct SearchRequest {
    term: String,
}

#[derive(Deserialize)]
struct LanguageSetRequest {
    language: Language,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateRequest {
    view: View,
    reset_context: Option<bool>,
}

#[derive(Serialize)]
struct StorageInfoResult {
    ok: bool,
    path_label: String,
}

#[derive(Serialize)]
struct PickFileResult {
    ok: bool,
    canceled: bool,
    name: Option<String>,
    data: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct PickImageResult {
    ok: bool,
    canceled: bool,
    name: Option<String>,
    image: Option<String>,
    error: Option<String>,
}

#[tauri::command]
fn app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
fn storage_info(app: AppHandle) -> Result<StorageInfoResult, String> {
    let root = storage_root_dir(&app)?;
    Ok(StorageInfoResult {
        ok: true,
        path_label: root.to_string_lossy().to_string(),
    })
}

#[tauri::command]
fn language_get(app: AppHandle) -> Result<Language, String> {
    let store = FsDocumentStore::new(&app)?;
    Ok(load_language(&store))
}

#[tauri::command]
fn language_set(app: AppHandle, payload: LanguageSetRequest) -> Result<bool, String> {
    let store = FsDocumentStore::new(&app)?;
    save_language(&store, payload.language).map_err(|err| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn auth_login(app: AppHandle, payload: LoginRequest) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    let users = load_users(&store);
    match resolve_login(&users, payload.username.as_str(), payload.password.as_str()) {
        Ok((user, view)) => {
            let mut session = lock_session()?;
            *session = SessionState::default();
            session.current_user = Some(user.clone());
            session.view = view;
            Ok(json!({ "ok": true, "user": user, "view": view }))
        }
        Err(err) => Ok(failure(&err, language)),
    }
}

#[tauri::command]
fn auth_logout() -> Result<bool, String> {
    let mut session = lock_session()?;
    *session = SessionState::default();
    Ok(true)
}

#[tauri::command]
fn auth_change_password(
    app: AppHandle,
    payload: ChangePasswordRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    let username = {
        let session = lock_session()?;
        current_user(&session)?.username
    };

    let mut users = load_users(&store);
    let result = change_password(
        &mut users,
        username.as_str(),
        payload.current_password.as_str(),
        payload.new_password.as_str(),
        payload.confirm_password.as_str(),
    );
    match result {
        Ok(()) => {
            save_users(&store, &users).map_err(|err| err.to_string())?;
            Ok(json!({ "ok": true, "message": password_changed_message(language) }))
        }
        Err(err) => Ok(failure(&err, language)),
    }
}

#[tauri::command]
fn users_list(app: AppHandle) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageUsers) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    let users = load_users(&store);
    let listed: Vec<CurrentUser> = users
        .iter()
        .map(|user| CurrentUser {
            username: user.username.clone(),
            role: user.role,
            permissions: user.permissions.clone(),
        })
        .collect();
    Ok(json!({ "ok": true, "users": listed }))
}

#[tauri::command]
fn users_add(app: AppHandle, payload: AddUserRequest) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageUsers) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    let permissions = payload
        .permissions
        .unwrap_or_else(|| DEFAULT_USER_PERMISSIONS.to_vec());
    let mut users = load_users(&store);
    match add_user(
        &mut users,
        payload.username.as_str(),
        payload.password.as_str(),
        permissions,
    ) {
        Ok(()) => {
            save_users(&store, &users).map_err(|err| err.to_string())?;
            Ok(json!({ "ok": true }))
        }
        Err(err) => Ok(failure(&err, language)),
    }
}

#[tauri::command]
fn users_remove(app: AppHandle, payload: RemoveUserRequest) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageUsers) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    let mut users = load_users(&store);
    let removed = remove_user(&mut users, payload.username.as_str());
    if removed {
        save_users(&store, &users).map_err(|err| err.to_string())?;
    }
    Ok(json!({ "ok": true, "removed": removed }))
}

#[tauri::command]
fn users_set_permissions(
    app: AppHandle,
    payload: SetPermissionsRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageUsers) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    let mut users = load_users(&store);
    let updated = set_user_permissions(&mut users, payload.username.as_str(), payload.permissions);
    if updated {
        save_users(&store, &users).map_err(|err| err.to_string())?;
    }
    Ok(json!({ "ok": true, "updated": updated }))
}

#[tauri::command]
fn projects_list(app: AppHandle) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    {
        let session = lock_session()?;
        current_user(&session)?;
    }
    let projects = load_projects(&store);
    Ok(json!({ "ok": true, "projects": projects }))
}

#[tauri::command]
fn project_save(app: AppHandle, payload: ProjectSaveRequest) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageProjects) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    let mut projects = load_projects(&store);
    match save_project(&mut projects, payload) {
        Ok(id) => {
            save_projects(&store, &projects).map_err(|err| err.to_string())?;
            Ok(json!({ "ok": true, "id": id }))
        }
        Err(err) => Ok(failure(&err, language)),
    }
}

#[tauri::command]
fn project_delete(
    app: AppHandle,
    payload: ProjectDeleteRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    let mut session = lock_session()?;
    let user = current_user(&session)?;
    if !has_permission(&user, Permission::ManageProjects) {
        return Ok(failure(&AppError::AccessDenied, language));
    }
    let removed = delete_project_and_persist(&store, &mut session, payload.id)
        .map_err(|err| err.to_string())?;
    Ok(json!({
        "ok": true,
        "removed": removed,
        "view": session.view,
        "context": session.unit_context,
    }))
}

#[tauri::command]
fn project_gallery_add(
    app: AppHandle,
    payload: GalleryAddRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageProjects) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    if payload.image.trim().is_empty() {
        return Ok(failure(&AppError::FileRead, language));
    }
    let mut projects = load_projects(&store);
    match append_gallery_image(&mut projects, payload.project_id, payload.image) {
        Ok(count) => {
            save_projects(&store, &projects).map_err(|err| err.to_string())?;
            Ok(json!({ "ok": true, "count": count }))
        }
        Err(err) => Ok(failure(&err, language)),
    }
}

#[tauri::command]
fn project_gallery_remove(
    app: AppHandle,
    payload: GalleryRemoveRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    {
        let session = lock_session()?;
        let user = current_user(&session)?;
        if !has_permission(&user, Permission::ManageProjects) {
            return Ok(failure(&AppError::AccessDenied, language));
        }
    }
    let mut projects = load_projects(&store);
    let index = usize::try_from(payload.index).ok();
    match remove_gallery_image(&mut projects, payload.project_id, index) {
        Ok(count) => {
            save_projects(&store, &projects).map_err(|err| err.to_string())?;
            Ok(json!({ "ok": true, "count": count }))
        }
        Err(err) => Ok(failure(&err, language)),
    }
}

#[tauri::command]
fn pick_spreadsheet_file() -> Result<PickFileResult, String> {
    let path = rfd::FileDialog::new()
        .add_filter("Excel", &["xlsx", "xls"])
        .pick_file();

    let Some(path) = path else {
        return Ok(PickFileResult {
            ok: false,
            canceled: true,
            name: None,
            data: None,
            error: None,
        });
    };

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!("spreadsheet read failed: {err}");
            return Ok(PickFileResult {
                ok: false,
                canceled: false,
                name: None,
                data: None,
                error: Some(AppError::FileRead.to_string()),
            });
        }
    };
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string());

    Ok(PickFileResult {
        ok: true,
        canceled: false,
        name,
        data: Some(B64.encode(bytes.as_slice())),
        error: None,
    })
}

#[tauri::command]
fn pick_image_file() -> Result<PickImageResult, String> {
    let path = rfd::FileDialog::new()
        .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp"])
        .pick_file();

    let Some(path) = path else {
        return Ok(PickImageResult {
            ok: false,
            canceled: true,
            name: None,
            image: None,
            error: None,
        });
    };

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!("image read failed: {err}");
            return Ok(PickImageResult {
                ok: false,
                canceled: false,
                name: None,
                image: None,
                error: Some(AppError::FileRead.to_string()),
            });
        }
    };
    let extension = path
        .extension()
        .map(|value| value.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string());
    let image = format!(
        "data:{};base64,{}",
        image_mime(extension.as_str()),
        B64.encode(bytes.as_slice())
    );

    Ok(PickImageResult {
        ok: true,
        canceled: false,
        name,
        image: Some(image),
        error: None,
    })
}

#[tauri::command]
fn units_import(app: AppHandle, payload: UnitsImportRequest) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);

    let bytes = match decode_spreadsheet_payload(payload.data.as_str()) {
        Ok(bytes) => bytes,
        Err(err) => return Ok(failure(&err, language)),
    };

    let imported = match payload.project_id {
        Some(project_id) => {
            {
                let session = lock_session()?;
                let user = current_user(&session)?;
                if !has_permission(&user, Permission::ManageProjects) {
                    return Ok(failure(&AppError::AccessDenied, language));
                }
            }
            import_project_units(&store, project_id, bytes.as_slice())
        }
        None => {
            let mut session = lock_session()?;
            current_user(&session)?;
            import_global_units(&mut session, bytes.as_slice())
        }
    };

    let count = match imported {
        Ok(count) => count,
        Err(AppError::Storage(text)) => return Err(text),
        Err(err) => return Ok(failure(&err, language)),
    };
    if let Some(name) = payload.file_name.as_deref() {
        tracing::info!("imported {count} units from {name}");
    }

    Ok(json!({
        "ok": true,
        "count": count,
        "message": upload_success_message(language, count),
    }))
}

#[tauri::command]
fn unit_context_set(
    app: AppHandle,
    payload: UnitContextRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    if let UnitContext::Project(project_id) = payload.context {
        let projects = load_projects(&store);
        if !projects.iter().any(|project| project.id == project_id) {
            return Ok(failure(&AppError::ProjectNotFound, language));
        }
    }
    let mut session = lock_session()?;
    current_user(&session)?;
    session.unit_context = payload.context;
    if matches!(payload.context, UnitContext::Project(_)) {
        session.view = View::Dashboard;
    }
    Ok(json!({ "ok": true, "context": session.unit_context, "view": session.view }))
}

#[tauri::command]
fn unit_update_field(
    app: AppHandle,
    payload: UnitUpdateRequest,
) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let language = load_language(&store);
    let mut session = lock_session()?;
    current_user(&session)?;

    let updated = match session.unit_context {
        UnitContext::Global => update_unit_field(
            &mut session.global_units,
            payload.unit_code.as_str(),
            payload.field.as_str(),
            payload.value,
        ),
        UnitContext::Project(project_id) => {
            let mut projects = load_projects(&store);
            let Some(project) = projects.iter_mut().find(|project| project.id == project_id)
            else {
                return Ok(failure(&AppError::ProjectNotFound, language));
            };
            let updated = update_unit_field(
                &mut project.detailed_units,
                payload.unit_code.as_str(),
                payload.field.as_str(),
                payload.value,
            );
            if updated {
                save_projects(&store, &projects).map_err(|err| err.to_string())?;
            }
            updated
        }
    };

    Ok(json!({ "ok": true, "updated": updated }))
}

#[tauri::command]
fn dashboard_set_filters(payload: FiltersPatchRequest) -> Result<serde_json::Value, String> {
    let mut session = lock_session()?;
    current_user(&session)?;
    if let Some(building_type) = payload.building_type {
        session.filters.building_type = building_type;
    }
    if let Some(ownership_status) = payload.ownership_status {
        session.filters.ownership_status = ownership_status;
    }
    if let Some(finishing) = payload.finishing {
        session.filters.finishing = finishing;
    }
    Ok(json!({ "ok": true, "filters": session.filters }))
}

#[tauri::command]
fn dashboard_set_sort(payload: SortRequest) -> Result<serde_json::Value, String> {
    let mut session = lock_session()?;
    current_user(&session)?;
    session.sort = Sort {
        key: payload.key,
        direction: payload.direction,
    };
    Ok(json!({ "ok": true, "sort": session.sort }))
}

#[tauri::command]
fn dashboard_set_search(payload: SearchRequest) -> Result<serde_json::Value, String> {
    let mut session = lock_session()?;
    current_user(&session)?;
    session.search_term = payload.term;
    Ok(json!({ "ok": true }))
}

#[tauri::command]
fn dashboard_clear_filters() -> Result<serde_json::Value, String> {
    let mut session = lock_session()?;
    current_user(&session)?;
    session.filters = Filters::default();
    session.sort = Sort::default();
    session.search_term = String::new();
    Ok(json!({ "ok": true }))
}

#[tauri::command]
fn view_navigate(payload: NavigateRequest) -> Result<serde_json::Value, String> {
    let mut session = lock_session()?;
    let user = current_user(&session)?;
    if payload.reset_context.unwrap_or(false) {
        session.unit_context = UnitContext::Global;
    }
    session.view = navigate_view(&user, payload.view);
    Ok(json!({ "ok": true, "view": session.view, "context": session.unit_context }))
}

#[tauri::command]
fn dashboard_view(app: AppHandle) -> Result<serde_json::Value, String> {
    let store = FsDocumentStore::new(&app)?;
    let session = lock_session()?;
    current_user(&session)?;

    let (units, context) = match session.unit_context {
        UnitContext::Global => (session.global_units.clone(), json!({ "source": "global" })),
        UnitContext::Project(project_id) => {
            let projects = load_projects(&store);
            match projects.iter().find(|project| project.id == project_id) {
                Some(project) => (
                    project.detailed_units.clone(),
                    json!({
                        "source": "project",
                        "projectId": project_id,
                        "projectName": project.name,
                    }),
                ),
                None => (
                    Vec::new(),
                    json!({ "source": "project", "projectId": project_id }),
                ),
            }
        }
    };

    let listed = query_units(
        &units,
        &session.filters,
        &session.sort,
        session.search_term.as_str(),
    );
    Ok(json!({
        "ok": true,
        "context": context,
        "totalCount": units.len(),
        "matchCount": listed.len(),
        "units": listed,
        "summary": summarize(&units),
        "filterOptions": filter_options(&units),
        "filters": session.filters,
        "sort": session.sort,
        "searchTerm": session.search_term,
    }))
}

fn session() -> &'static Mutex<SessionState> {
    static SESSION: OnceLock<Mutex<SessionState>> = OnceLock::new();
    SESSION.get_or_init(|| Mutex::new(SessionState::default()))
}

fn lock_session() -> Result<MutexGuard<'static, SessionState>, String> {
    session()
        .lock()
        .map_err(|_| "Session state unavailable.".to_string())
}

fn current_user(session: &SessionState) -> Result<CurrentUser, String> {
    session
        .current_user
        .clone()
        .ok_or_else(|| "Not logged in.".to_string())
}

fn failure(err: &AppError, language: Language) -> serde_json::Value {
    json!({
        "ok": false,
        "code": err.code(),
        "error": error_message(err, language),
    })
}

trait DocumentStore {
    fn get(&self, name: &str) -> Result<Option<String>, AppError>;
    fn set(&self, name: &str, text: &str) -> Result<(), AppError>;
}

struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    fn new(app: &AppHandle) -> Result<Self, String> {
        Ok(FsDocumentStore {
            root: storage_root_dir(app)?,
        })
    }
}

impl DocumentStore for FsDocumentStore {
    fn get(&self, name: &str) -> Result<Option<String>, AppError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path)
            .map(Some)
            .map_err(|err| AppError::Storage(err.to_string()))
    }

    fn set(&self, name: &str, text: &str) -> Result<(), AppError> {
        write_text_file(self.root.join(name), text).map_err(AppError::Storage)
    }
}

fn storage_root_dir(app: &AppHandle) -> Result<PathBuf, String> {
    static RESOLVED_ROOT: OnceLock<PathBuf> = OnceLock::new();
    if let Some(root) = RESOLVED_ROOT.get() {
        return Ok(root.clone());
    }

    let base = app.path().app_data_dir().map_err(|err| err.to_string())?;
    let root = base.join("UnitDashboard");
    fs::create_dir_all(root.as_path()).map_err(|err| err.to_string())?;
    let _ = RESOLVED_ROOT.set(root.clone());
    Ok(root)
}

fn write_text_file(path: PathBuf, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    fs::write(path, content).map_err(|err| err.to_string())?;
    Ok(())
}

fn default_admin() -> User {
    User {
        username: "admin".to_string(),
        password: "password".to_string(),
        role: Role::Admin,
        permissions: ALL_PERMISSIONS.to_vec(),
    }
}

// Older user documents predate per-user permissions. Backfill by role so
// they keep deserializing.
fn ensure_users_shape(value: serde_json::Value) -> serde_json::Value {
    let mut users = value.as_array().cloned().unwrap_or_default();
    for user in users.iter_mut() {
        let Some(object) = user.as_object_mut() else {
            continue;
        };
        if object.contains_key("permissions") {
            continue;
        }
        let role = object
            .get("role")
            .and_then(|value| value.as_str())
            .unwrap_or("user");
        let backfill = if role == "admin" {
            json!(ALL_PERMISSIONS)
        } else {
            json!(DEFAULT_USER_PERMISSIONS)
        };
        object.insert("permissions".to_string(), backfill);
    }
    serde_json::Value::Array(users)
}

fn load_users<S: DocumentStore>(store: &S) -> Vec<User> {
    let raw = match store.get(USERS_FILE) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("failed to read users document: {err}");
            None
        }
    };
    let Some(text) = raw else {
        return seed_users(store);
    };
    let parsed: serde_json::Value = match serde_json::from_str(text.as_str()) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("users document is corrupt: {err}");
            return seed_users(store);
        }
    };
    match serde_json::from_value::<Vec<User>>(ensure_users_shape(parsed)) {
        Ok(users) if !users.is_empty() => users,
        _ => seed_users(store),
    }
}

fn seed_users<S: DocumentStore>(store: &S) -> Vec<User> {
    let users = vec![default_admin()];
    if let Err(err) = save_users(store, &users) {
        tracing::warn!("failed to seed users document: {err}");
    }
    users
}

fn save_users<S: DocumentStore>(store: &S, users: &[User]) -> Result<(), AppError> {
    let text =
        serde_json::to_string_pretty(users).map_err(|err| AppError::Storage(err.to_string()))?;
    store.set(USERS_FILE, text.as_str())
}

fn load_projects<S: DocumentStore>(store: &S) -> Vec<Project> {
    let raw = match store.get(PROJECTS_FILE) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("failed to read projects document: {err}");
            None
        }
    };
    let Some(text) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<Project>>(text.as_str()) {
        Ok(projects) => projects,
        Err(err) => {
            tracing::warn!("projects document is corrupt: {err}");
            Vec::new()
        }
    }
}

fn save_projects<S: DocumentStore>(store: &S, projects: &[Project]) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(projects)
        .map_err(|err| AppError::Storage(err.to_string()))?;
    store.set(PROJECTS_FILE, text.as_str())
}

fn load_language<S: DocumentStore>(store: &S) -> Language {
    let raw = match store.get(SETTINGS_FILE) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("failed to read settings document: {err}");
            None
        }
    };
    let Some(text) = raw else {
        return Language::default();
    };
    serde_json::from_str::<Settings>(text.as_str())
        .map(|settings| settings.language)
        .unwrap_or_default()
}

fn save_language<S: DocumentStore>(store: &S, language: Language) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(&Settings { language })
        .map_err(|err| AppError::Storage(err.to_string()))?;
    store.set(SETTINGS_FILE, text.as_str())
}

fn has_permission(user: &CurrentUser, permission: Permission) -> bool {
    user.role == Role::Admin || user.permissions.contains(&permission)
}

fn initial_view(user: &CurrentUser) -> View {
    if has_permission(user, Permission::ViewDashboard) {
        View::Dashboard
    } else if has_permission(user, Permission::ViewProjects) {
        View::Projects
    } else {
        View::Users
    }
}

fn navigate_view(user: &CurrentUser, requested: View) -> View {
    let allowed = match requested {
        // Login is only reachable through logout; an authenticated session
        // never lands there.
        View::Login => false,
        View::Dashboard => has_permission(user, Permission::ViewDashboard),
        View::Projects | View::ProjectDetail(_) => has_permission(user, Permission::ViewProjects),
        View::Users => has_permission(user, Permission::ManageUsers),
    };
    if allowed {
        requested
    } else {
        initial_view(user)
    }
}

fn resolve_login(
    users: &[User],
    username: &str,
    password: &str,
) -> Result<(CurrentUser, View), AppError> {
    let Some(user) = users
        .iter()
        .find(|user| user.username == username && user.password == password)
    else {
        return Err(AppError::Credential);
    };
    let current = CurrentUser {
        username: user.username.clone(),
        role: user.role,
        permissions: user.permissions.clone(),
    };
    let can_view_dashboard = has_permission(&current, Permission::ViewDashboard);
    let can_view_projects = has_permission(&current, Permission::ViewProjects);
    if !can_view_dashboard && !can_view_projects && current.role != Role::Admin {
        return Err(AppError::AccessDenied);
    }
    let view = initial_view(&current);
    Ok((current, view))
}

fn add_user(
    users: &mut Vec<User>,
    username: &str,
    password: &str,
    permissions: Vec<Permission>,
) -> Result<(), AppError> {
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err(AppError::EmptyField);
    }
    if users.iter().any(|user| user.username == username) {
        return Err(AppError::DuplicateUsername);
    }
    users.push(User {
        username: username.to_string(),
        password: password.to_string(),
        role: Role::User,
        permissions,
    });
    Ok(())
}

fn remove_user(users: &mut Vec<User>, username: &str) -> bool {
    let before = users.len();
    users.retain(|user| user.username != username);
    users.len() != before
}

fn set_user_permissions(users: &mut [User], username: &str, permissions: Vec<Permission>) -> bool {
    match users.iter_mut().find(|user| user.username == username) {
        Some(user) => {
            user.permissions = permissions;
            true
        }
        None => false,
    }
}

fn change_password(
    users: &mut [User],
    username: &str,
    current: &str,
    next: &str,
    confirm: &str,
) -> Result<(), AppError> {
    if current.is_empty() || next.is_empty() || confirm.is_empty() {
        return Err(AppError::EmptyField);
    }
    if next.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::PasswordTooShort);
    }
    if next != confirm {
        return Err(AppError::PasswordMismatch);
    }
    let Some(user) = users.iter_mut().find(|user| user.username == username) else {
        return Err(AppError::Credential);
    };
    if user.password != current {
        return Err(AppError::IncorrectPassword);
    }
    user.password = next.to_string();
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

fn new_project_id(projects: &[Project]) -> i64 {
    let mut id = now_millis();
    while projects.iter().any(|project| project.id == id) {
        id += 1;
    }
    id
}

fn save_project(projects: &mut Vec<Project>, patch: ProjectSaveRequest) -> Result<i64, AppError> {
    if let Some(id) = patch.id {
        let Some(project) = projects.iter_mut().find(|project| project.id == id) else {
            return Err(AppError::ProjectNotFound);
        };
        if let Some(name) = patch.name {
            project.name = name;
        }
        if let Some(logo) = patch.logo {
            project.logo = Some(logo);
        }
        if let Some(description) = patch.description {
            project.description = description;
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if let Some(location) = patch.location {
            project.location = location;
        }
        if let Some(project_type) = patch.project_type {
            project.project_type = project_type;
        }
        if let Some(units) = patch.units {
            project.units = units;
        }
        if let Some(completion_date) = patch.completion_date {
            project.completion_date = completion_date;
        }
        if let Some(features) = patch.features {
            project.features = features;
        }
        if let Some(unit_types) = patch.unit_types {
            project.unit_types = unit_types;
        }
        return Ok(id);
    }

    let name = patch.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(AppError::EmptyField);
    }
    let id = new_project_id(projects);
    projects.push(Project {
        id,
        name,
        logo: patch.logo,
        description: patch.description.unwrap_or_default(),
        status: patch.status.unwrap_or_default(),
        location: patch.location.unwrap_or_default(),
        project_type: patch.project_type.unwrap_or_default(),
        units: patch.units.unwrap_or(0),
        completion_date: patch.completion_date.unwrap_or_default(),
        features: patch.features.unwrap_or_default(),
        unit_types: patch.unit_types.unwrap_or_default(),
        detailed_units: Vec::new(),
        gallery_images: Vec::new(),
    });
    Ok(id)
}

fn delete_project(projects: &mut Vec<Project>, id: i64) -> bool {
    let before = projects.len();
    projects.retain(|project| project.id != id);
    projects.len() != before
}

fn cascade_after_delete(session: &mut SessionState, id: i64) {
    if session.view == View::ProjectDetail(id) {
        session.view = View::Projects;
    }
    if session.unit_context == UnitContext::Project(id) {
        session.unit_context = UnitContext::Global;
        session.view = View::Dashboard;
    }
}

// Persist first so a failed write cannot leave the session pointing at a
// project the store still contains.
fn delete_project_and_persist<S: DocumentStore>(
    store: &S,
    session: &mut SessionState,
    id: i64,
) -> Result<bool, AppError> {
    let mut projects = load_projects(store);
    let removed = delete_project(&mut projects, id);
    if removed {
        save_projects(store, &projects)?;
        cascade_after_delete(session, id);
    }
    Ok(removed)
}

fn attach_units(
    projects: &mut [Project],
    id: i64,
    records: Vec<UnitRecord>,
) -> Result<usize, AppError> {
    let Some(project) = projects.iter_mut().find(|project| project.id == id) else {
        return Err(AppError::ProjectNotFound);
    };
    project.units = records.len() as i64;
    project.detailed_units = records;
    Ok(project.detailed_units.len())
}

fn append_gallery_image(
    projects: &mut [Project],
    id: i64,
    image: String,
) -> Result<usize, AppError> {
    let Some(project) = projects.iter_mut().find(|project| project.id == id) else {
        return Err(AppError::ProjectNotFound);
    };
    project.gallery_images.push(image);
    Ok(project.gallery_images.len())
}

fn remove_gallery_image(
    projects: &mut [Project],
    id: i64,
    index: Option<usize>,
) -> Result<usize, AppError> {
    let Some(project) = projects.iter_mut().find(|project| project.id == id) else {
        return Err(AppError::ProjectNotFound);
    };
    // Out-of-bounds removal is a silent no-op.
    if let Some(index) = index {
        if index < project.gallery_images.len() {
            project.gallery_images.remove(index);
        }
    }
    Ok(project.gallery_images.len())
}

type RawRow = Vec<(String, CellValue)>;

fn normalize_header_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|ch| match ch {
            '²' => Some('2'),
            '³' => Some('3'),
            ch if ch.is_ascii_alphanumeric() => Some(ch),
            _ => None,
        })
        .collect()
}

fn canonical_field(normalized: &str) -> Option<&'static str> {
    Some(match normalized {
        "unitcode" => "unitCode",
        "buildingtype" => "buildingType",
        "floor" => "floor",
        "area" | "aream2" | "aream" => "area",
        "ownershipstatus" => "ownershipStatus",
        "zone" => "zone",
        "rooms" => "rooms",
        "building" => "building",
        "type" => "type",
        "floorstatus" => "floorStatus",
        "category" => "category",
        "views" => "views",
        "meterprice" => "meterPrice",
        "unitstatus" => "unitStatus",
        "finishing" | "finishingstatus" | "finishingsituation" => "finishing",
        "garage" | "garagestatus" | "garageavailable" => "garage",
        "unitsfinishingsituationsite" | "finishingsituationsite" | "situationfinishing" => {
            "finishingSituationSite"
        }
        _ => return None,
    })
}

/// Maps raw spreadsheet rows onto canonical unit fields. Unknown columns are
/// kept under their trimmed original header, and later columns win when two
/// headers normalize to the same field. Rows are never dropped here.
fn normalize_rows(rows: &[RawRow]) -> Vec<UnitRecord> {
    rows.iter()
        .map(|row| {
            let mut record = UnitRecord::default();
            for (header, value) in row {
                match canonical_field(normalize_header_key(header).as_str()) {
                    Some(field) => record.set(field, value.clone()),
                    None => {
                        record
                            .extra
                            .insert(header.trim().to_string(), value.clone());
                    }
                }
            }
            record
        })
        .collect()
}

fn validate_units(records: &[UnitRecord]) -> Result<(), AppError> {
    let Some(first) = records.first() else {
        return Err(AppError::InvalidFormat);
    };
    let code_ok = first
        .unit_code
        .as_ref()
        .map(CellValue::is_truthy)
        .unwrap_or(false);
    if !code_ok || first.area.is_none() {
        return Err(AppError::InvalidFormat);
    }
    Ok(())
}

fn decode_spreadsheet_payload(data: &str) -> Result<Vec<u8>, AppError> {
    let trimmed = data.trim();
    let encoded = match trimmed.find("base64,") {
        Some(index) => &trimmed[index + "base64,".len()..],
        None => trimmed,
    };
    B64.decode(encoded).map_err(|_| AppError::FileRead)
}

fn parse_spreadsheet_rows(bytes: &[u8]) -> Result<Vec<RawRow>, AppError> {
    use calamine::{open_workbook_auto_from_rs, Reader};

    let cursor = Cursor::new(bytes);
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|_| AppError::InvalidFormat)?;
    let sheet_names = workbook.sheet_names();
    let Some(sheet_name) = sheet_names.first().cloned() else {
        return Err(AppError::InvalidFormat);
    };
    let range = workbook
        .worksheet_range(sheet_name.as_str())
        .map_err(|_| AppError::InvalidFormat)?;

    let mut headers: Vec<(usize, String)> = Vec::new();
    for column in 0..range.width() {
        if let Some(cell) = range.get((0, column)) {
            let header = header_text(cell);
            if !header.is_empty() {
                headers.push((column, header));
            }
        }
    }

    let mut rows: Vec<RawRow> = Vec::new();
    for row_index in 1..range.height() {
        let mut row: RawRow = Vec::new();
        for (column, header) in headers.iter() {
            let Some(cell) = range.get((row_index, *column)) else {
                continue;
            };
            if let Some(value) = cell_value(cell) {
                row.push((header.clone(), value));
            }
        }
        // Fully blank rows are skipped, matching how sheet readers emit rows.
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn header_text(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::String(text) => text.trim().to_string(),
        Data::Float(number) => number.to_string(),
        Data::Int(number) => number.to_string(),
        Data::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

fn cell_value(cell: &calamine::Data) -> Option<CellValue> {
    use calamine::Data;
    match cell {
        Data::Empty => None,
        Data::String(text) => Some(CellValue::Text(text.clone())),
        Data::Float(number) => Some(CellValue::Number(*number)),
        Data::Int(number) => Some(CellValue::Number(*number as f64)),
        Data::Bool(flag) => Some(CellValue::Bool(*flag)),
        Data::DateTime(datetime) => Some(CellValue::Number(datetime.as_f64())),
        Data::DateTimeIso(text) => Some(CellValue::Text(text.clone())),
        Data::DurationIso(text) => Some(CellValue::Text(text.clone())),
        Data::Error(_) => None,
    }
}

fn ingest_spreadsheet(bytes: &[u8]) -> Result<Vec<UnitRecord>, AppError> {
    let rows = parse_spreadsheet_rows(bytes)?;
    let records = normalize_rows(&rows);
    validate_units(&records)?;
    Ok(records)
}

/// A global import replaces the session's transient list wholesale; nothing
/// changes when ingestion fails.
fn import_global_units(session: &mut SessionState, bytes: &[u8]) -> Result<usize, AppError> {
    let records = ingest_spreadsheet(bytes)?;
    let count = records.len();
    session.global_units = records;
    session.unit_context = UnitContext::Global;
    Ok(count)
}

fn import_project_units<S: DocumentStore>(
    store: &S,
    id: i64,
    bytes: &[u8],
) -> Result<usize, AppError> {
    let records = ingest_spreadsheet(bytes)?;
    let mut projects = load_projects(store);
    let count = attach_units(&mut projects, id, records)?;
    save_projects(store, &projects)?;
    Ok(count)
}

fn coerce_field_value(field: &str, value: CellValue) -> CellValue {
    if NUMERIC_UNIT_FIELDS.contains(&field) {
        if let CellValue::Text(text) = &value {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if let Ok(number) = trimmed.parse::<f64>() {
                    return CellValue::Number(number);
                }
            }
        }
    }
    value
}

fn update_unit_field(
    units: &mut [UnitRecord],
    unit_code: &str,
    field: &str,
    value: CellValue,
) -> bool {
    let coerced = coerce_field_value(field, value);
    let mut updated = false;
    for unit in units.iter_mut() {
        if unit.unit_code_text() == unit_code {
            unit.set(field, coerced.clone());
            updated = true;
        }
    }
    updated
}

fn filter_matches(unit: &UnitRecord, filters: &Filters) -> bool {
    dimension_matches(unit.building_type.as_ref(), filters.building_type.as_str())
        && dimension_matches(
            unit.ownership_status.as_ref(),
            filters.ownership_status.as_str(),
        )
        && dimension_matches(unit.finishing.as_ref(), filters.finishing.as_str())
}

fn dimension_matches(value: Option<&CellValue>, filter: &str) -> bool {
    if filter == "all" {
        return true;
    }
    match value {
        Some(value) => value.to_text() == filter,
        None => false,
    }
}

fn sort_cell<'a>(value: Option<&'a CellValue>, fallback: &'a CellValue) -> &'a CellValue {
    match value {
        // A blanked-out text cell sorts as 0, same as a missing one.
        Some(CellValue::Text(text)) if text.is_empty() => fallback,
        Some(value) => value,
        None => fallback,
    }
}

fn compare_sort_cells(a: Option<&CellValue>, b: Option<&CellValue>) -> Ordering {
    let fallback = CellValue::Number(0.0);
    let a = sort_cell(a, &fallback);
    let b = sort_cell(b, &fallback);
    // Numeric-first coercion: when both sides look numeric, compare as
    // numbers; otherwise fall back to lexicographic text order.
    match (a.as_number(), b.as_number()) {
        (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        _ => a.to_text().cmp(&b.to_text()),
    }
}

/// Search, then filter, then stable-sort. Each stage runs over the whole
/// set; the order is part of the contract.
fn query_units(
    records: &[UnitRecord],
    filters: &Filters,
    sort: &Sort,
    search_term: &str,
) -> Vec<UnitRecord> {
    let needle = search_term.trim().to_lowercase();
    let mut result: Vec<UnitRecord> = records
        .iter()
        .filter(|unit| {
            if !needle.is_empty() {
                let code = unit.unit_code_text();
                if !code.trim().to_lowercase().contains(needle.as_str()) {
                    return false;
                }
            }
            filter_matches(unit, filters)
        })
        .cloned()
        .collect();

    let field = sort.key.field();
    result.sort_by(|a, b| {
        let ordering = compare_sort_cells(a.get(field), b.get(field));
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    result
}

fn filter_options(records: &[UnitRecord]) -> FilterOptions {
    let mut options = FilterOptions::default();
    for unit in records {
        push_option(&mut options.building_types, unit.building_type.as_ref());
        push_option(
            &mut options.ownership_statuses,
            unit.ownership_status.as_ref(),
        );
        push_option(&mut options.finishings, unit.finishing.as_ref());
    }
    options
}

fn push_option(list: &mut Vec<String>, value: Option<&CellValue>) {
    let Some(value) = value else {
        return;
    };
    let text = value.to_text();
    if text.is_empty() || list.contains(&text) {
        return;
    }
    list.push(text);
}

fn status_text(value: Option<&CellValue>) -> String {
    value
        .map(CellValue::to_text)
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn summarize(records: &[UnitRecord]) -> UnitSummary {
    let total = records.len() as i64;
    let mut sold = 0_i64;
    let mut ats = 0_i64;
    for unit in records {
        let unit_status = status_text(unit.unit_status.as_ref());
        let ownership_status = status_text(unit.ownership_status.as_ref());
        if unit_status == "ats" {
            ats += 1;
        } else if ownership_status == "sold"
            || SOLD_UNIT_STATUSES.contains(&unit_status.as_str())
        {
            sold += 1;
        }
    }
    let total_area: f64 = records
        .iter()
        .map(|unit| {
            unit.area
                .as_ref()
                .and_then(CellValue::as_number)
                .unwrap_or(0.0)
        })
        .sum();
    let avg_area = if total > 0 {
        (total_area / total as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };
    UnitSummary {
        total_units: total,
        available: total - sold - ats,
        sold,
        ats,
        avg_area,
    }
}

fn image_mime(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn error_message(err: &AppError, language: Language) -> String {
    if language == Language::En {
        return err.to_string();
    }
    match err {
        AppError::FileRead => "فشل في قراءة الملف.",
        AppError::InvalidFormat => {
            "تنسيق Excel غير صالح. تأكد من أن الورقة تحتوي على الأقل على عمودي 'Unit Code' و 'Area'."
        }
        AppError::Credential => "اسم المستخدم أو كلمة المرور غير صالحة.",
        AppError::AccessDenied => "ليس لديك صلاحية للوصول إلى أي صفحات.",
        AppError::DuplicateUsername => "اسم المستخدم موجود بالفعل.",
        AppError::EmptyField => "يرجى ملء جميع الحقول المطلوبة.",
        AppError::PasswordTooShort => "يجب أن لا تقل كلمة المرور عن 6 أحرف.",
        AppError::PasswordMismatch => "كلمتا المرور الجديدتان غير متطابقتين.",
        AppError::IncorrectPassword => "كلمة المرور الحالية غير صحيحة.",
        AppError::ProjectNotFound => "المشروع غير موجود.",
        AppError::Storage(_) => return err.to_string(),
    }
    .to_string()
}

fn upload_success_message(language: Language, count: usize) -> String {
    let template = match language {
        Language::En => "Successfully uploaded {count} units.",
        Language::Ar => "تم رفع {count} وحدة بنجاح.",
    };
    template.replace("{count}", count.to_string().as_str())
}

fn password_changed_message(language: Language) -> String {
    match language {
        Language::En => "Password changed successfully.",
        Language::Ar => "تم تغيير كلمة المرور بنجاح.",
    }
    .to_string()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            app_version,
            storage_info,
            language_get,
            language_set,
            auth_login,
            auth_logout,
            auth_change_password,
            users_list,
            users_add,
            users_remove,
            users_set_permissions,
            projects_list,
            project_save,
            project_delete,
            project_gallery_add,
            project_gallery_remove,
            pick_spreadsheet_file,
            pick_image_file,
            units_import,
            unit_context_set,
            unit_update_field,
            dashboard_set_filters,
            dashboard_set_sort,
            dashboard_set_search,
            dashboard_clear_filters,
            view_navigate,
            dashboard_view
        ])
        .run(tauri::generate_context!())
        .expect("failed to run Unit Dashboard");
}
