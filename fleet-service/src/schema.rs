diesel::table! {
    vehicles (id) {
        id -> Uuid,
        make -> Varchar,
        model -> Varchar,
        availability -> Bool,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        vehicle_id -> Uuid,
        user_id -> Uuid,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(reservations -> vehicles (vehicle_id));

diesel::allow_tables_to_appear_in_same_query!(vehicles, reservations);
