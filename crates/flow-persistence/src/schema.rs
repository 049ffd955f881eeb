//! Esquema Diesel. Debe coincidir con `migrations/`.

diesel::table! {
    workspaces (id) {
        id -> Uuid,
        name -> Text,
        flow_count -> Integer,
        updated -> Timestamptz,
    }
}

diesel::table! {
    workspace_members (workspace_id, user_id) {
        workspace_id -> Uuid,
        user_id -> Uuid,
    }
}

diesel::table! {
    records (kind, id) {
        seq -> BigInt,
        kind -> Text,
        id -> Uuid,
        scope_id -> Nullable<Uuid>,
        body -> Jsonb,
    }
}

diesel::joinable!(workspace_members -> workspaces (workspace_id));

diesel::allow_tables_to_appear_in_same_query!(workspaces, workspace_members, records,);
