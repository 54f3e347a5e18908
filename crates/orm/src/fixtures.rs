//! Sample entities used by the loom test suites.

use crate::convert::{FromDict, FromDictOptions};
use crate::entity::{Entity, EntityView, Related};
use crate::error::{ModelError, ModelResult};
use crate::schema::{EntitySchema, FieldDescriptor, FieldType};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

fn opt_i64(entity: &str, name: &str, value: Value) -> ModelResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) if n.is_i64() => Ok(n.as_i64()),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ModelError::invalid_attribute(entity, name, "expected an integer")),
        _ => Err(ModelError::invalid_attribute(entity, name, "expected an integer")),
    }
}

fn string(entity: &str, name: &str, value: Value) -> ModelResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ModelError::invalid_attribute(entity, name, "expected a string")),
    }
}

fn opt_string(entity: &str, name: &str, value: Value) -> ModelResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        other => string(entity, name, other).map(Some),
    }
}

fn unknown(entity: &str, name: &str) -> ModelError {
    ModelError::invalid_attribute(entity, name, "unknown attribute")
}

static USER_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::builder("User", "users")
        .field(FieldDescriptor::primary_key("id", FieldType::Integer))
        .field(FieldDescriptor::foreign_key("group_id", FieldType::Integer, "groups.id").nullable())
        .field(FieldDescriptor::column("name", FieldType::String).max_length(50))
        .field(FieldDescriptor::column("email", FieldType::String).max_length(120))
        .field(FieldDescriptor::column("password_hash", FieldType::String).nullable().hidden())
        .field(FieldDescriptor::column("_login_count", FieldType::Integer).with_default())
        .field(FieldDescriptor::relationship("posts", "Post", true))
        .field(FieldDescriptor::hybrid("display_name", FieldType::String))
        .build()
});

/// A user with posts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub group_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub login_count: i64,
    /// `None` until loaded.
    pub posts: Option<Vec<Post>>,
}

impl User {
    pub fn new(id: i64, name: &str, email: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_string(),
            email: email.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for User {
    fn schema() -> &'static EntitySchema {
        &USER_SCHEMA
    }

    fn get(&self, name: &str) -> Option<Value> {
        let value = match name {
            "id" => json!(self.id),
            "group_id" => json!(self.group_id),
            "name" => json!(self.name),
            "email" => json!(self.email),
            "password_hash" => json!(self.password_hash),
            "_login_count" => json!(self.login_count),
            "display_name" => json!(format!("{} <{}>", self.name, self.email)),
            _ => return None,
        };
        Some(value)
    }

    fn set(&mut self, name: &str, value: Value) -> ModelResult<()> {
        match name {
            "id" => self.id = opt_i64("User", name, value)?,
            "group_id" => self.group_id = opt_i64("User", name, value)?,
            "name" => self.name = string("User", name, value)?,
            "email" => self.email = string("User", name, value)?,
            "password_hash" => self.password_hash = opt_string("User", name, value)?,
            "_login_count" => self.login_count = opt_i64("User", name, value)?.unwrap_or(0),
            _ => return Err(unknown("User", name)),
        }
        Ok(())
    }

    fn related(&self, name: &str) -> Related<'_> {
        match (name, &self.posts) {
            ("posts", Some(posts)) => Related::Many(posts.iter().map(|p| p as &dyn EntityView).collect()),
            _ => Related::NotLoaded,
        }
    }

    fn set_related(&mut self, name: &str, value: Value) -> ModelResult<()> {
        if name != "posts" {
            return Err(unknown("User", name));
        }
        let Value::Array(items) = value else {
            return Err(ModelError::Relationship("posts must be a list".to_string()));
        };
        let mut posts = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(data) = item else {
                return Err(ModelError::Relationship("post must be a mapping".to_string()));
            };
            posts.push(Post::new_from_dict(&data, &FromDictOptions::default().with_pk())?);
        }
        self.posts = Some(posts);
        Ok(())
    }
}

static POST_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::builder("Post", "posts")
        .field(FieldDescriptor::primary_key("id", FieldType::Integer))
        .field(FieldDescriptor::foreign_key("user_id", FieldType::Integer, "users.id"))
        .field(FieldDescriptor::column("title", FieldType::String).max_length(200))
        .field(FieldDescriptor::column("body", FieldType::Text).nullable())
        .field(FieldDescriptor::column("published_on", FieldType::Date).nullable())
        .field(FieldDescriptor::relationship("author", "User", false))
        .field(FieldDescriptor::relationship("tags", "Tag", true))
        .build()
});

/// A blog post owned by a [`User`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub title: String,
    pub body: Option<String>,
    pub published_on: Option<NaiveDate>,
    /// Outer `None` until loaded, inner `None` when there is no author.
    pub author: Option<Option<Box<User>>>,
    pub tags: Option<Vec<Tag>>,
}

impl Post {
    pub fn new(id: i64, user_id: i64, title: &str) -> Self {
        Self {
            id: Some(id),
            user_id: Some(user_id),
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: Option<User>) -> Self {
        self.author = Some(author.map(Box::new));
        self
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = Some(tags);
        self
    }
}

impl Entity for Post {
    fn schema() -> &'static EntitySchema {
        &POST_SCHEMA
    }

    fn get(&self, name: &str) -> Option<Value> {
        let value = match name {
            "id" => json!(self.id),
            "user_id" => json!(self.user_id),
            "title" => json!(self.title),
            "body" => json!(self.body),
            "published_on" => json!(self.published_on.map(|d| d.to_string())),
            _ => return None,
        };
        Some(value)
    }

    fn set(&mut self, name: &str, value: Value) -> ModelResult<()> {
        match name {
            "id" => self.id = opt_i64("Post", name, value)?,
            "user_id" => self.user_id = opt_i64("Post", name, value)?,
            "title" => self.title = string("Post", name, value)?,
            "body" => self.body = opt_string("Post", name, value)?,
            "published_on" => {
                self.published_on = match opt_string("Post", name, value)? {
                    Some(raw) => Some(raw.parse().map_err(|_| {
                        ModelError::invalid_attribute("Post", name, "expected an ISO date")
                    })?),
                    None => None,
                }
            }
            _ => return Err(unknown("Post", name)),
        }
        Ok(())
    }

    fn related(&self, name: &str) -> Related<'_> {
        match name {
            "author" => match &self.author {
                None => Related::NotLoaded,
                Some(None) => Related::Null,
                Some(Some(user)) => Related::One(&**user),
            },
            "tags" => match &self.tags {
                None => Related::NotLoaded,
                Some(tags) => Related::Many(tags.iter().map(|t| t as &dyn EntityView).collect()),
            },
            _ => Related::NotLoaded,
        }
    }
}

static TAG_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::builder("Tag", "tags")
        .field(FieldDescriptor::primary_key("id", FieldType::Integer))
        .field(FieldDescriptor::column("name", FieldType::String).max_length(30))
        .build()
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub name: String,
}

impl Tag {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_string(),
        }
    }
}

impl Entity for Tag {
    fn schema() -> &'static EntitySchema {
        &TAG_SCHEMA
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(json!(self.id)),
            "name" => Some(json!(self.name)),
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: Value) -> ModelResult<()> {
        match name {
            "id" => self.id = opt_i64("Tag", name, value)?,
            "name" => self.name = string("Tag", name, value)?,
            _ => return Err(unknown("Tag", name)),
        }
        Ok(())
    }
}

static MEMBERSHIP_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::builder("Membership", "memberships")
        .table_schema("auth")
        .field(FieldDescriptor::primary_key("user_id", FieldType::Integer))
        .field(FieldDescriptor::primary_key("group_id", FieldType::Integer))
        .field(FieldDescriptor::column("role", FieldType::String).max_length(20))
        .build()
});

/// Entity with a composite primary key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
    pub role: String,
}

impl Membership {
    pub fn new(user_id: i64, group_id: i64, role: &str) -> Self {
        Self {
            user_id: Some(user_id),
            group_id: Some(group_id),
            role: role.to_string(),
        }
    }
}

impl Entity for Membership {
    fn schema() -> &'static EntitySchema {
        &MEMBERSHIP_SCHEMA
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "user_id" => Some(json!(self.user_id)),
            "group_id" => Some(json!(self.group_id)),
            "role" => Some(json!(self.role)),
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: Value) -> ModelResult<()> {
        match name {
            "user_id" => self.user_id = opt_i64("Membership", name, value)?,
            "group_id" => self.group_id = opt_i64("Membership", name, value)?,
            "role" => self.role = string("Membership", name, value)?,
            _ => return Err(unknown("Membership", name)),
        }
        Ok(())
    }
}
