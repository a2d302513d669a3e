use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bucket::DateBucketIndex;
use crate::cache::{CategoryCache, MissionCache};
use crate::calendar::{CalendarMonth, month_grid, padded_month_grid};
use crate::cli::{AddArgs, CalendarArgs, CategoryCommand, Command, EditArgs, FilterArgs, ListArgs};
use crate::config::{Backend, Config};
use crate::datetime::{local_now, local_today, parse_day_expr};
use crate::error::MissionError;
use crate::filter::MissionFilter;
use crate::mission::{
    Category, CreateCategoryData, CreateMissionData, Mission, MissionStatus, UpdateCategoryData,
    UpdateMissionData, format_day_key,
};
use crate::render::{Renderer, short_id};
use crate::session::{Session, clear_session, load_session, save_session};
use crate::stats::{compute_stats, summarize};
use crate::store::{FileStore, MissionStore, RestStore};

enum StoreHandle {
    File(Arc<FileStore>),
    Rest(Arc<RestStore>),
}

/// Everything a command needs: settings, data directory and the backend.
pub struct App {
    pub cfg: Config,
    pub data_dir: PathBuf,
    pub renderer: Renderer,
    store: StoreHandle,
}

impl App {
    #[instrument(skip(cfg, renderer))]
    pub fn open(cfg: Config, data_dir: PathBuf, renderer: Renderer) -> anyhow::Result<Self> {
        let store = match cfg.backend()? {
            Backend::File => {
                let store = FileStore::open(&data_dir).with_context(|| {
                    format!("failed to open file store at {}", data_dir.display())
                })?;
                StoreHandle::File(Arc::new(store))
            }
            Backend::Rest => {
                let rest_cfg = cfg.rest_config()?;
                StoreHandle::Rest(Arc::new(
                    RestStore::new(rest_cfg).context("failed to configure rest store")?,
                ))
            }
        };

        Ok(Self {
            cfg,
            data_dir,
            renderer,
            store,
        })
    }

    fn store(&self) -> Arc<dyn MissionStore> {
        match &self.store {
            StoreHandle::File(store) => Arc::clone(store) as Arc<dyn MissionStore>,
            StoreHandle::Rest(store) => Arc::clone(store) as Arc<dyn MissionStore>,
        }
    }

    /// Saved session, or for the file backend the configured profile.
    fn session(&self) -> anyhow::Result<Session> {
        let saved = load_session(&self.data_dir)?;
        match &self.store {
            StoreHandle::Rest(_) => match saved {
                Some(session) if session.access_token.is_some() => Ok(session),
                _ => Err(MissionError::NotSignedIn.into()),
            },
            StoreHandle::File(store) => match saved {
                Some(session) if session.access_token.is_none() => Ok(session),
                _ => Ok(store.sign_in(&self.cfg.profile())?),
            },
        }
    }

    async fn missions(&self) -> anyhow::Result<MissionCache> {
        let cache = MissionCache::new(self.store(), self.session()?);
        cache.refresh().await.context("failed to load missions")?;
        Ok(cache)
    }

    async fn categories(&self, session: &Session) -> anyhow::Result<CategoryCache> {
        let cache = CategoryCache::new(self.store(), session.clone());
        cache.refresh().await.context("failed to load categories")?;
        Ok(cache)
    }
}

#[instrument(skip(app, command))]
pub async fn dispatch(app: &App, command: Option<Command>) -> anyhow::Result<()> {
    let command = command.unwrap_or(Command::List(ListArgs {
        filter: FilterArgs::default(),
        date: None,
    }));
    debug!(?command, "dispatching command");

    match command {
        Command::Signup { email, password } => cmd_signup(app, &email, &password).await,
        Command::Login {
            email,
            password,
            profile,
        } => cmd_login(app, email, password, profile).await,
        Command::Logout => cmd_logout(app).await,
        Command::Add(args) => cmd_add(app, args).await,
        Command::List(args) => cmd_list(app, args).await,
        Command::Show { id } => cmd_show(app, &id).await,
        Command::Edit(args) => cmd_edit(app, args).await,
        Command::Delete { id } => cmd_delete(app, &id).await,
        Command::Start { id } => cmd_step(app, &id, MissionStatus::Todo).await,
        Command::Done { id } => cmd_step(app, &id, MissionStatus::InProgress).await,
        Command::Reopen { id } => cmd_reopen(app, &id).await,
        Command::Calendar(args) => cmd_calendar(app, args).await,
        Command::Stats(args) => cmd_stats(app, args).await,
        Command::Category(sub) => cmd_category(app, sub).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn rest_store(app: &App, action: &str) -> anyhow::Result<Arc<RestStore>> {
    match &app.store {
        StoreHandle::Rest(store) => Ok(Arc::clone(store)),
        StoreHandle::File(_) => bail!("{action} needs store.backend = rest"),
    }
}

#[instrument(skip(app, password))]
async fn cmd_signup(app: &App, email: &str, password: &str) -> anyhow::Result<()> {
    info!("command signup");
    let store = rest_store(app, "signup")?;
    match store.sign_up(email, password).await? {
        Some(session) => {
            save_session(&app.data_dir, &session)?;
            println!("Account created; signed in as {}.", session.display_name());
        }
        None => println!("Account created. Confirm the email, then run `mission login`."),
    }
    Ok(())
}

#[instrument(skip(app, password))]
async fn cmd_login(
    app: &App,
    email: Option<String>,
    password: Option<String>,
    profile: Option<String>,
) -> anyhow::Result<()> {
    info!("command login");
    let session = match &app.store {
        StoreHandle::Rest(store) => {
            let (Some(email), Some(password)) = (email, password) else {
                bail!("login on the rest backend needs --email and --password");
            };
            store.sign_in(&email, &password).await?
        }
        StoreHandle::File(store) => {
            if email.is_some() {
                bail!("the file backend has no accounts; use --profile NAME");
            }
            let profile = profile.unwrap_or_else(|| app.cfg.profile());
            store.sign_in(&profile)?
        }
    };

    save_session(&app.data_dir, &session)?;
    println!("Signed in as {}.", session.display_name());
    Ok(())
}

#[instrument(skip(app))]
async fn cmd_logout(app: &App) -> anyhow::Result<()> {
    info!("command logout");
    let saved = load_session(&app.data_dir)?;

    if let (StoreHandle::Rest(store), Some(session)) = (&app.store, saved.as_ref())
        && let Err(err) = store.sign_out(session).await
    {
        warn!(error = %err, "remote sign-out failed; clearing local session anyway");
    }

    if clear_session(&app.data_dir)? {
        println!("Signed out.");
    } else {
        println!("No active session.");
    }
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_add(app: &App, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");
    let cache = app.missions().await?;

    let date = parse_day_expr(&args.date, local_today())?;
    let mut data = CreateMissionData::new(
        args.title.join(" "),
        date,
        args.duration,
        args.importance,
    );
    data.description = args.description;
    data.scheduled_time = args.time;
    data.priority = args.priority;
    data.status = args.status;
    if !args.tags.is_empty() {
        data.tags = Some(args.tags);
    }
    if let Some(token) = args.category.as_deref() {
        let categories = app.categories(cache.session()).await?;
        data.category_id = Some(resolve_category(&categories.categories(), token)?.id);
    }

    let mission = cache.create(data).await?;
    debug!(count = cache.len(), "mission added");
    println!(
        "Created mission {} on {}.",
        short_id(&mission),
        mission.scheduled_date
    );
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_list(app: &App, args: ListArgs) -> anyhow::Result<()> {
    info!("command list");
    let cache = app.missions().await?;
    let categories = app.categories(cache.session()).await?;
    let filter = args.filter.filter();

    let missions = match args.date.as_deref() {
        Some(raw) => {
            let day = parse_day_expr(raw, local_today())?;
            filter.apply_on_day(&cache.missions(), day)
        }
        None => cache.get_filtered_missions(filter.status, filter.importance),
    };

    if missions.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    app.renderer
        .print_mission_table(&missions, &categories.categories())
}

#[instrument(skip(app))]
async fn cmd_show(app: &App, token: &str) -> anyhow::Result<()> {
    info!("command show");
    let cache = app.missions().await?;
    let mission = resolve_mission(&cache.missions(), token)?.clone();
    let categories = app.categories(cache.session()).await?;
    app.renderer
        .print_mission_info(&mission, categories.category_for(&mission).as_ref())
}

#[instrument(skip(app, args))]
async fn cmd_edit(app: &App, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");
    let cache = app.missions().await?;
    let mission = resolve_mission(&cache.missions(), &args.id)?.clone();

    let mut patch = UpdateMissionData::new(mission.id);
    patch.title = args.title;
    if args.clear_description {
        patch.description = Some(None);
    } else if let Some(description) = args.description {
        patch.description = Some(Some(description));
    }
    if let Some(raw) = args.date.as_deref() {
        patch.scheduled_date = Some(format_day_key(parse_day_expr(raw, local_today())?));
    }
    patch.estimated_duration = args.duration;
    patch.importance = args.importance;
    patch.status = args.status;
    if args.clear_time {
        patch.scheduled_time = Some(None);
    } else if let Some(time) = args.time {
        patch.scheduled_time = Some(Some(time));
    }
    if args.clear_priority {
        patch.priority = Some(None);
    } else if let Some(priority) = args.priority {
        patch.priority = Some(Some(priority));
    }
    if args.clear_tags {
        patch.tags = Some(None);
    } else if !args.tags.is_empty() {
        patch.tags = Some(Some(args.tags));
    }
    if args.clear_category {
        patch.category_id = Some(None);
    } else if let Some(token) = args.category.as_deref() {
        let categories = app.categories(cache.session()).await?;
        patch.category_id = Some(Some(resolve_category(&categories.categories(), token)?.id));
    }

    if patch.is_empty() {
        bail!("nothing to change; pass at least one field option");
    }

    let updated = cache.update(patch).await?;
    println!("Modified mission {}.", short_id(&updated));
    Ok(())
}

#[instrument(skip(app))]
async fn cmd_delete(app: &App, token: &str) -> anyhow::Result<()> {
    info!("command delete");
    let cache = app.missions().await?;
    let mission = resolve_mission(&cache.missions(), token)?.clone();
    cache.delete(mission.id).await?;
    println!("Deleted mission {} '{}'.", short_id(&mission), mission.title);
    Ok(())
}

/// `start` and `done` each advance from exactly one status.
#[instrument(skip(app))]
async fn cmd_step(app: &App, token: &str, from: MissionStatus) -> anyhow::Result<()> {
    info!("command step");
    let cache = app.missions().await?;
    let mission = resolve_mission(&cache.missions(), token)?.clone();
    if mission.status != from {
        bail!(
            "mission {} is {}; this command applies to {} missions",
            short_id(&mission),
            mission.status,
            from
        );
    }

    let updated = cache.advance(mission.id).await?;
    println!(
        "Mission {} is now {}.",
        short_id(&updated),
        updated.status.label()
    );
    Ok(())
}

#[instrument(skip(app))]
async fn cmd_reopen(app: &App, token: &str) -> anyhow::Result<()> {
    info!("command reopen");
    let cache = app.missions().await?;
    let mission = resolve_mission(&cache.missions(), token)?.clone();
    let updated = cache.reopen(mission.id).await?;
    println!("Reopened mission {}.", short_id(&updated));
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_calendar(app: &App, args: CalendarArgs) -> anyhow::Result<()> {
    info!("command calendar");
    let cache = app.missions().await?;
    let today = local_today();
    let month = args.month.unwrap_or_else(|| CalendarMonth::containing(today));
    let selected = args
        .select
        .as_deref()
        .map(|raw| parse_day_expr(raw, today))
        .transpose()?;
    let filter = args.filter.filter();

    let filtered = cache.get_filtered_missions(filter.status, filter.importance);
    let index = DateBucketIndex::build(&filtered);
    for rejected in index.rejected() {
        eprintln!("warning: {rejected}");
    }

    let week_start = app.cfg.week_start()?;
    let cells = if args.padded || app.cfg.padded_calendar() {
        padded_month_grid(month, &index, today, selected, week_start)
    } else {
        month_grid(month, &index, today, selected)
    };
    app.renderer.print_month(month, &cells, week_start)?;

    if let Some(day) = selected {
        let missions = index.bucket(day);
        println!();
        println!("{}", day.format("%A %Y-%m-%d"));
        if missions.is_empty() {
            println!("No missions.");
        } else {
            let categories = app.categories(cache.session()).await?;
            app.renderer
                .print_mission_table(missions, &categories.categories())?;
        }
    }
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_stats(app: &App, args: FilterArgs) -> anyhow::Result<()> {
    info!("command stats");
    let cache = app.missions().await?;
    let filter: MissionFilter = args.filter();

    let (stats, summary) = if filter.is_identity() {
        (cache.get_stats(local_now()), cache.summary())
    } else {
        let missions = filter.apply(&cache.missions());
        (compute_stats(&missions, local_now()), summarize(&missions))
    };
    app.renderer.print_stats(&stats, &summary)
}

#[instrument(skip(app, sub))]
async fn cmd_category(app: &App, sub: CategoryCommand) -> anyhow::Result<()> {
    info!("command category");
    let session = app.session()?;
    let cache = app.categories(&session).await?;

    match sub {
        CategoryCommand::List => {
            let categories = cache.categories();
            if categories.is_empty() {
                println!("No categories.");
                return Ok(());
            }
            app.renderer.print_categories(&categories)
        }
        CategoryCommand::Add { name, color, icon } => {
            let mut data = CreateCategoryData::new(name);
            if let Some(color) = color {
                data.color = color;
            }
            data.icon = icon;
            let category = cache.create(data).await?;
            println!("Created category {} '{}'.", &category.id.to_string()[..8], category.name);
            Ok(())
        }
        CategoryCommand::Edit {
            id,
            name,
            color,
            icon,
            clear_icon,
        } => {
            let target = resolve_category(&cache.categories(), &id)?.id;
            let mut patch = UpdateCategoryData::new(target);
            patch.name = name;
            patch.color = color;
            if clear_icon {
                patch.icon = Some(None);
            } else if let Some(icon) = icon {
                patch.icon = Some(Some(icon));
            }
            let category = cache.update(patch).await?;
            println!("Modified category '{}'.", category.name);
            Ok(())
        }
        CategoryCommand::Delete { id } => {
            let target = resolve_category(&cache.categories(), &id)?.clone();
            cache.delete(target.id).await?;
            println!("Deleted category '{}'.", target.name);
            Ok(())
        }
    }
}

/// Full id or a unique leading fragment of it.
fn resolve_by_prefix<'a, T>(
    items: &'a [T],
    token: &str,
    id_of: impl Fn(&T) -> Uuid,
    what: &str,
) -> anyhow::Result<&'a T> {
    let needle = token.trim().to_ascii_lowercase();
    if needle.is_empty() {
        bail!("empty {what} id");
    }
    if let Ok(full) = Uuid::parse_str(&needle) {
        return items
            .iter()
            .find(|item| id_of(item) == full)
            .ok_or_else(|| anyhow!("no {what} with id {full}"));
    }

    let mut matches = items
        .iter()
        .filter(|item| id_of(item).to_string().starts_with(&needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no {what} matches id {token}"))?;
    if matches.next().is_some() {
        bail!("{what} id {token} is ambiguous; type more characters");
    }
    Ok(first)
}

fn resolve_mission<'a>(missions: &'a [Mission], token: &str) -> anyhow::Result<&'a Mission> {
    resolve_by_prefix(missions, token, |m| m.id, "mission")
}

/// Id prefix first, then exact name ignoring case.
fn resolve_category<'a>(categories: &'a [Category], token: &str) -> anyhow::Result<&'a Category> {
    if let Some(by_name) = categories
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(token.trim()))
    {
        return Ok(by_name);
    }
    resolve_by_prefix(categories, token, |c| c.id, "category")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: Uuid::parse_str(id).expect("uuid"),
            user_id: "u1".to_string(),
            name: name.to_string(),
            color: "#3b82f6".to_string(),
            icon: None,
            created_at: Utc
                .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    fn sample() -> Vec<Category> {
        vec![
            category("aa11aa11-0000-4000-8000-000000000001", "Work"),
            category("aa22bb22-0000-4000-8000-000000000002", "Home"),
            category("bb33cc33-0000-4000-8000-000000000003", "Health"),
        ]
    }

    #[test]
    fn resolves_unique_prefix_and_full_id() {
        let items = sample();
        assert_eq!(resolve_category(&items, "bb").expect("prefix").name, "Health");
        assert_eq!(
            resolve_category(&items, "AA22BB22-0000-4000-8000-000000000002")
                .expect("full id")
                .name,
            "Home"
        );
    }

    #[test]
    fn ambiguous_or_missing_prefix_fails() {
        let items = sample();
        let err = resolve_category(&items, "aa").expect_err("ambiguous");
        assert!(err.to_string().contains("ambiguous"));
        assert!(resolve_category(&items, "ff").is_err());
        assert!(resolve_category(&items, " ").is_err());
    }

    #[test]
    fn category_name_match_wins() {
        let items = sample();
        assert_eq!(resolve_category(&items, "work").expect("by name").name, "Work");
    }
}
