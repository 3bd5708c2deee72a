use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::{NotSet, Set, Unchanged}, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, SqlErr, Statement,
};
use serde::de::DeserializeOwned;

use models::{app, service, service_instance, team};

use crate::domain::{App, EnvVar, Service, ServiceInstance, Team};
use crate::errors::{messages, ServiceError};
use crate::repository::EntityStore;

/// Postgres-backed store. Bound lists and env maps are `jsonb`, mutated with
/// conditional single-row `UPDATE`s so concurrent writers cannot lose entries.
pub struct SeaOrmEntityStore {
    pub db: DatabaseConnection,
}

impl SeaOrmEntityStore {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }

    async fn exec(&self, sql: &str, values: Vec<sea_orm::Value>) -> Result<u64, ServiceError> {
        let res = self
            .db
            .execute(Statement::from_sql_and_values(DbBackend::Postgres, sql, values))
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }

    /// Runs a conditional `UPDATE .. RETURNING` on `service`; `None` when no row matched.
    async fn update_service_returning(&self, sql: &str, values: Vec<sea_orm::Value>) -> Result<Option<Service>, ServiceError> {
        let row = service::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(DbBackend::Postgres, sql, values))
            .one(&self.db)
            .await
            .map_err(db_err)?;
        row.map(service_from_model).transpose()
    }

    async fn instance_exists(&self, name: &str) -> Result<bool, ServiceError> {
        let n = service_instance::Entity::find_by_id(name.to_string()).count(&self.db).await.map_err(db_err)?;
        Ok(n > 0)
    }
}

fn db_err(e: DbErr) -> ServiceError { ServiceError::Failure(e.to_string()) }

fn insert_err(e: DbErr, conflict: impl FnOnce() -> String) -> ServiceError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(conflict()),
        _ => db_err(e),
    }
}

fn from_json<T: DeserializeOwned>(v: serde_json::Value) -> Result<T, ServiceError> {
    serde_json::from_value(v).map_err(|e| ServiceError::Failure(format!("corrupt document: {e}")))
}

fn to_json<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(v).map_err(ServiceError::failure)
}

fn service_from_model(m: service::Model) -> Result<Service, ServiceError> {
    Ok(Service {
        name: m.name,
        endpoints: from_json(m.endpoints)?,
        teams: from_json(m.teams)?,
        doc: m.doc,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn instance_from_model(m: service_instance::Model) -> Result<ServiceInstance, ServiceError> {
    Ok(ServiceInstance {
        name: m.name,
        service_name: m.service_name,
        teams: from_json(m.teams)?,
        apps: from_json(m.apps)?,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn app_from_model(m: app::Model) -> Result<App, ServiceError> {
    Ok(App {
        name: m.name,
        framework: m.framework,
        teams: from_json(m.teams)?,
        units: from_json(m.units)?,
        env: from_json(m.env)?,
    })
}

fn team_from_model(m: team::Model) -> Result<Team, ServiceError> {
    Ok(Team { name: m.name, users: from_json(m.users)? })
}

#[async_trait]
impl EntityStore for SeaOrmEntityStore {
    async fn insert_service(&self, s: &Service) -> Result<(), ServiceError> {
        let am = service::ActiveModel {
            name: Set(s.name.clone()),
            endpoints: Set(to_json(&s.endpoints)?),
            teams: Set(to_json(&s.teams)?),
            doc: Set(s.doc.clone()),
            created_at: Set(s.created_at.into()),
        };
        am.insert(&self.db).await.map_err(|e| insert_err(e, || messages::service_exists(&s.name)))?;
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Option<Service>, ServiceError> {
        let m = service::Entity::find_by_id(name.to_string()).one(&self.db).await.map_err(db_err)?;
        m.map(service_from_model).transpose()
    }

    async fn update_service(&self, s: &Service) -> Result<(), ServiceError> {
        let am = service::ActiveModel {
            name: Unchanged(s.name.clone()),
            endpoints: Set(to_json(&s.endpoints)?),
            teams: NotSet,
            doc: Set(s.doc.clone()),
            created_at: NotSet,
        };
        match am.update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into())),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn add_team_to_service(&self, name: &str, team: &str) -> Result<Service, ServiceError> {
        let updated = self
            .update_service_returning(
                r#"UPDATE "service" SET "teams" = "teams" || jsonb_build_array($1::text)
                   WHERE "name" = $2 AND NOT ("teams" @> jsonb_build_array($1::text))
                   RETURNING "name", "endpoints", "teams", "doc", "created_at""#,
                vec![team.into(), name.into()],
            )
            .await?;
        if let Some(s) = updated {
            return Ok(s);
        }
        match self.get_service(name).await? {
            Some(_) => Err(ServiceError::Conflict(messages::TEAM_ALREADY_HAS_ACCESS.into())),
            None => Err(ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into())),
        }
    }

    async fn remove_team_from_service(&self, name: &str, team: &str) -> Result<Service, ServiceError> {
        let updated = self
            .update_service_returning(
                r#"UPDATE "service" SET "teams" = "teams" - $1::text
                   WHERE "name" = $2 AND "teams" @> jsonb_build_array($1::text)
                     AND jsonb_array_length("teams") > 1
                   RETURNING "name", "endpoints", "teams", "doc", "created_at""#,
                vec![team.into(), name.into()],
            )
            .await?;
        if let Some(s) = updated {
            return Ok(s);
        }
        match self.get_service(name).await? {
            None => Err(ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into())),
            Some(s) if s.teams.len() < 2 => Err(ServiceError::Forbidden(messages::ORPHAN_SERVICE.into())),
            Some(_) => Err(ServiceError::NotFound(messages::TEAM_WITHOUT_ACCESS.into())),
        }
    }

    async fn delete_service(&self, name: &str) -> Result<bool, ServiceError> {
        let res = service::Entity::delete_by_id(name.to_string()).exec(&self.db).await.map_err(db_err)?;
        Ok(res.rows_affected > 0)
    }

    async fn list_services(&self) -> Result<Vec<Service>, ServiceError> {
        let rows = service::Entity::find()
            .order_by_asc(service::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(service_from_model).collect()
    }

    async fn insert_instance(&self, i: &ServiceInstance) -> Result<(), ServiceError> {
        let am = service_instance::ActiveModel {
            name: Set(i.name.clone()),
            service_name: Set(i.service_name.clone()),
            teams: Set(to_json(&i.teams)?),
            apps: Set(to_json(&i.apps)?),
            created_at: Set(i.created_at.into()),
        };
        am.insert(&self.db).await.map_err(|e| insert_err(e, || messages::instance_exists(&i.name)))?;
        Ok(())
    }

    async fn get_instance(&self, name: &str) -> Result<Option<ServiceInstance>, ServiceError> {
        let m = service_instance::Entity::find_by_id(name.to_string()).one(&self.db).await.map_err(db_err)?;
        m.map(instance_from_model).transpose()
    }

    async fn delete_instance(&self, name: &str) -> Result<bool, ServiceError> {
        let res = service_instance::Entity::delete_by_id(name.to_string()).exec(&self.db).await.map_err(db_err)?;
        Ok(res.rows_affected > 0)
    }

    async fn list_instances(&self) -> Result<Vec<ServiceInstance>, ServiceError> {
        let rows = service_instance::Entity::find()
            .order_by_asc(service_instance::Column::CreatedAt)
            .order_by_asc(service_instance::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(instance_from_model).collect()
    }

    async fn count_instances_of_service(&self, service_name: &str) -> Result<u64, ServiceError> {
        service_instance::Entity::find()
            .filter(service_instance::Column::ServiceName.eq(service_name))
            .count(&self.db)
            .await
            .map_err(db_err)
    }

    async fn add_app_to_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError> {
        let n = self
            .exec(
                r#"UPDATE "service_instance" SET "apps" = "apps" || jsonb_build_array($1::text)
                   WHERE "name" = $2 AND NOT ("apps" @> jsonb_build_array($1::text))"#,
                vec![app.into(), instance.into()],
            )
            .await?;
        if n > 0 {
            return Ok(true);
        }
        if self.instance_exists(instance).await? {
            Ok(false)
        } else {
            Err(ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()))
        }
    }

    async fn remove_app_from_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError> {
        let n = self
            .exec(
                r#"UPDATE "service_instance" SET "apps" = "apps" - $1::text
                   WHERE "name" = $2 AND "apps" @> jsonb_build_array($1::text)"#,
                vec![app.into(), instance.into()],
            )
            .await?;
        if n > 0 {
            return Ok(true);
        }
        if self.instance_exists(instance).await? {
            Ok(false)
        } else {
            Err(ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()))
        }
    }

    async fn insert_app(&self, a: &App) -> Result<(), ServiceError> {
        let am = app::ActiveModel {
            name: Set(a.name.clone()),
            framework: Set(a.framework.clone()),
            teams: Set(to_json(&a.teams)?),
            units: Set(to_json(&a.units)?),
            env: Set(to_json(&a.env)?),
        };
        am.insert(&self.db)
            .await
            .map_err(|e| insert_err(e, || format!("App with name {} already exists.", a.name)))?;
        Ok(())
    }

    async fn get_app(&self, name: &str) -> Result<Option<App>, ServiceError> {
        let m = app::Entity::find_by_id(name.to_string()).one(&self.db).await.map_err(db_err)?;
        m.map(app_from_model).transpose()
    }

    async fn set_app_env(&self, app: &str, vars: &[EnvVar]) -> Result<(), ServiceError> {
        let patch: serde_json::Map<String, serde_json::Value> =
            vars.iter().map(|v| Ok((v.name.clone(), to_json(v)?))).collect::<Result<_, ServiceError>>()?;
        let n = self
            .exec(
                r#"UPDATE "app" SET "env" = "env" || $1::jsonb WHERE "name" = $2"#,
                vec![serde_json::Value::Object(patch).into(), app.into()],
            )
            .await?;
        if n == 0 {
            return Err(ServiceError::NotFound(messages::APP_NOT_FOUND.into()));
        }
        Ok(())
    }

    async fn unset_app_env(&self, app: &str, keys: &[String]) -> Result<(), ServiceError> {
        let n = self
            .exec(
                r#"UPDATE "app" SET "env" = "env" - ARRAY(SELECT jsonb_array_elements_text($1::jsonb))
                   WHERE "name" = $2"#,
                vec![to_json(&keys)?.into(), app.into()],
            )
            .await?;
        if n == 0 {
            return Err(ServiceError::NotFound(messages::APP_NOT_FOUND.into()));
        }
        Ok(())
    }

    async fn unset_app_env_from_instance(&self, app: &str, instance: &str) -> Result<(), ServiceError> {
        let n = self
            .exec(
                r#"UPDATE "app" SET "env" = COALESCE(
                       (SELECT jsonb_object_agg(e.key, e.value) FROM jsonb_each("app"."env") AS e
                        WHERE e.value->>'instance_name' IS DISTINCT FROM $1),
                       '{}'::jsonb)
                   WHERE "name" = $2"#,
                vec![instance.into(), app.into()],
            )
            .await?;
        if n == 0 {
            return Err(ServiceError::NotFound(messages::APP_NOT_FOUND.into()));
        }
        Ok(())
    }

    async fn replace_app_env_from_instance(&self, app: &str, instance: &str, vars: &[EnvVar]) -> Result<(), ServiceError> {
        let patch: serde_json::Map<String, serde_json::Value> =
            vars.iter().map(|v| Ok((v.name.clone(), to_json(v)?))).collect::<Result<_, ServiceError>>()?;
        let n = self
            .exec(
                r#"UPDATE "app" SET "env" = COALESCE(
                       (SELECT jsonb_object_agg(e.key, e.value) FROM jsonb_each("app"."env") AS e
                        WHERE e.value->>'instance_name' IS DISTINCT FROM $1),
                       '{}'::jsonb) || $2::jsonb
                   WHERE "name" = $3"#,
                vec![instance.into(), serde_json::Value::Object(patch).into(), app.into()],
            )
            .await?;
        if n == 0 {
            return Err(ServiceError::NotFound(messages::APP_NOT_FOUND.into()));
        }
        Ok(())
    }

    async fn insert_team(&self, t: &Team) -> Result<(), ServiceError> {
        let am = team::ActiveModel { name: Set(t.name.clone()), users: Set(to_json(&t.users)?) };
        am.insert(&self.db)
            .await
            .map_err(|e| insert_err(e, || format!("Team with name {} already exists.", t.name)))?;
        Ok(())
    }

    async fn get_team(&self, name: &str) -> Result<Option<Team>, ServiceError> {
        let m = team::Entity::find_by_id(name.to_string()).one(&self.db).await.map_err(db_err)?;
        m.map(team_from_model).transpose()
    }

    async fn teams_of_user(&self, email: &str) -> Result<Vec<Team>, ServiceError> {
        let rows = team::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"SELECT "name", "users" FROM "team" WHERE "users" @> jsonb_build_array($1::text) ORDER BY "name""#,
                [email.into()],
            ))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(team_from_model).collect()
    }
}
