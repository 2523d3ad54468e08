use serde_json::json;
use serde_json::Map;
use serde_json::Value;

pub fn user_fixture() -> Map<String, Value> {
    let user = json!({
        "id": 1,
        "email": "a@x.com",
        "name": "Amara Perera",
        "district": "Colombo"
    });

    if let Value::Object(map) = user {
        return map;
    }

    unreachable!("user fixture is an object");
}

pub fn login_response_fixture() -> Value {
    return json!({
        "user": { "id": 1, "email": "a@x.com" },
        "token": "abc123"
    });
}

pub fn cases_fixture() -> Value {
    return json!([
        {
            "id": 101,
            "district": "Colombo",
            "reported_at": "2024-03-02",
            "status": "confirmed"
        },
        {
            "id": 102,
            "district": "Gampaha",
            "reported_at": "2024-03-03",
            "status": "suspected"
        }
    ]);
}
